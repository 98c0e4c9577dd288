//! Similarity metrics for the iterative baseline.

pub mod trait_;
pub mod mse;
pub mod ncc;

pub use trait_::{fixed_values, sample_moving, Metric, CHUNK_SIZE};
pub use mse::MeanSquaredError;
pub use ncc::NormalizedCrossCorrelation;
