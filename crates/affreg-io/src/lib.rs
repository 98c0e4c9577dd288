//! Reading and writing volumes, and assembling them into registration pairs.

pub mod nifti_io;
pub mod dataset;

pub use nifti_io::{read_nifti, read_nifti_volume, write_nifti, NiftiVolume};
pub use dataset::{discover_pairs, load_pairs, split_pairs, LoadedPair, Preprocessing, VolumePair};
