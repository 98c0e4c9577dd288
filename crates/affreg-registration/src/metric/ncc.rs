//! Normalized cross correlation metric.

use affreg_core::image::Image;
use affreg_core::transform::Transform;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{fixed_values, sample_moving, Metric};

const EPSILON: f64 = 1e-10;

/// Zero-normalised cross correlation between intensities:
/// NCC = sum((F - mean(F)) * (M - mean(M))) / sqrt(sum((F - mean(F))^2) * sum((M - mean(M))^2))
///
/// Returns `-NCC` so that a perfect linear match gives the minimum of -1.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCrossCorrelation;

impl NormalizedCrossCorrelation {
    pub fn new() -> Self {
        Self
    }

    /// NCC of two equally long sample vectors, as a `[1]` tensor.
    pub fn correlation<B: Backend>(a: Tensor<B, 1>, b: Tensor<B, 1>) -> Tensor<B, 1> {
        let a = a.clone() - a.mean();
        let b = b.clone() - b.mean();

        let numerator = (a.clone() * b.clone()).sum();
        let denominator = (a.powf_scalar(2.0).sum() * b.powf_scalar(2.0).sum()).sqrt() + EPSILON;
        numerator / denominator
    }
}

impl<B: Backend, const D: usize> Metric<B, D> for NormalizedCrossCorrelation {
    fn forward(
        &self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Tensor<B, 1> {
        let moving_values = sample_moving(fixed, moving, transform);
        Self::correlation(fixed_values(fixed), moving_values).neg()
    }

    fn name(&self) -> &'static str {
        "NormalizedCrossCorrelation"
    }
}
