//! Sampling of tensors at continuous voxel indices.

pub mod trait_;
pub mod linear;

pub use trait_::Interpolator;
pub use linear::LinearInterpolator;
