//! Corner-aligned resizing of volumes to a fixed tensor shape.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::gaussian::GaussianFilter;
use crate::error::Result;
use crate::image::{generate_grid, Image};
use crate::interpolation::{Interpolator, LinearInterpolator};

/// Resample a volume to `shape` (`[z, y, x]`) over the same physical extent.
///
/// The first and last voxel centres keep their physical positions, so normalised
/// coordinates in `[-1, 1]` refer to the same points before and after resizing. A grid
/// theta estimated on the resized pair therefore applies unchanged to the originals.
#[derive(Debug, Clone)]
pub struct ResizeFilter {
    shape: [usize; 3],
    antialias: bool,
}

impl ResizeFilter {
    pub fn new(shape: [usize; 3]) -> Self {
        Self { shape, antialias: true }
    }

    /// Smooth before shrinking an axis (on by default).
    pub fn with_antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        let geometry = image.geometry();
        let target = geometry.resized(self.shape)?;
        if target.size == geometry.size {
            return Ok(image.clone());
        }

        let source = if self.antialias {
            // sigma of half the new spacing along axes that shrink
            let sigmas: Vec<f64> = (0..3)
                .map(|axis| {
                    if target.spacing[axis] > geometry.spacing[axis] * 1.01 {
                        0.5 * target.spacing[axis]
                    } else {
                        0.0
                    }
                })
                .collect();
            if sigmas.iter().any(|&s| s > 0.0) {
                GaussianFilter::new(sigmas).apply(image)?
            } else {
                image.clone()
            }
        } else {
            image.clone()
        };

        let device = image.data().device();
        let ratio: Vec<f32> = (0..3)
            .map(|axis| ((geometry.size[axis] - 1) as f64 / (target.size[axis] - 1) as f64) as f32)
            .collect();
        let ratio = Tensor::<B, 1>::from_data(TensorData::new(ratio, Shape::new([3])), &device).reshape([1, 3]);

        let indices = generate_grid::<B, 3>(self.shape, &device) * ratio;
        let values = LinearInterpolator::new().interpolate(source.data(), indices);

        Image::from_geometry(values.reshape(self.shape), &target)
    }
}
