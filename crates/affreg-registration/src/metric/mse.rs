//! Mean squared error metric.

use affreg_core::image::Image;
use affreg_core::transform::Transform;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{fixed_values, sample_moving, Metric};

/// Mean squared intensity difference:
/// MSE = (1/N) * sum((Fixed(x) - Moving(T(x)))^2)
///
/// Only meaningful when both volumes share an intensity scale, which holds after the
/// same intensity normalisation has been applied to each.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl MeanSquaredError {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend, const D: usize> Metric<B, D> for MeanSquaredError {
    fn forward(
        &self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Tensor<B, 1> {
        let diff = sample_moving(fixed, moving, transform) - fixed_values(fixed);
        diff.powf_scalar(2.0).mean()
    }

    fn name(&self) -> &'static str {
        "MeanSquaredError"
    }
}
