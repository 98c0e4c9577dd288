//! Image filters: smoothing, decimation, pyramids, resampling, resizing and
//! intensity normalisation.

pub mod gaussian;
pub mod downsample;
pub mod pyramid;
pub mod resample;
pub mod resize;
pub mod intensity;

pub use gaussian::GaussianFilter;
pub use downsample::DownsampleFilter;
pub use pyramid::MultiResolutionPyramid;
pub use resample::ResampleImageFilter;
pub use resize::ResizeFilter;
pub use intensity::IntensityNormalization;
