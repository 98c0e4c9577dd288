use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use affreg_core::transform::convention::THETA_LEN;

/// Weighted squared error between predicted and target grid thetas.
///
/// The linear 3×3 block and the translation column are averaged separately so that
/// their weights stay meaningful regardless of how many entries each has.
#[derive(Config, Debug)]
pub struct AffineParameterLossConfig {
    #[config(default = 1.0)]
    pub linear_weight: f64,
    #[config(default = 1.0)]
    pub translation_weight: f64,
}

impl AffineParameterLossConfig {
    pub fn init(&self) -> AffineParameterLoss {
        AffineParameterLoss {
            linear_weight: self.linear_weight,
            translation_weight: self.translation_weight,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AffineParameterLoss {
    linear_weight: f64,
    translation_weight: f64,
}

impl AffineParameterLoss {
    /// `[B, 12]` prediction and target → `[1]` loss.
    pub fn forward<B: Backend>(&self, prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        let [b, _] = prediction.dims();
        let squared = (prediction - target).powf_scalar(2.0).reshape([b, 3, THETA_LEN / 3]);

        let linear = squared.clone().narrow(2, 0, 3).mean();
        let translation = squared.narrow(2, 3, 1).mean();
        linear * self.linear_weight + translation * self.translation_weight
    }
}

const NCC_EPSILON: f64 = 1e-5;

/// Global normalised cross correlation between volumes, per batch element.
///
/// Inputs are `[B, C, D, H, W]`; the result is `[B]` with values in `[-1, 1]`.
pub fn global_ncc<B: Backend>(fixed: Tensor<B, 5>, warped: Tensor<B, 5>) -> Tensor<B, 1> {
    let [b, ..] = fixed.dims();
    let i = fixed.flatten::<2>(1, 4);
    let j = warped.flatten::<2>(1, 4);

    let i_hat = i.clone() - i.mean_dim(1);
    let j_hat = j.clone() - j.mean_dim(1);

    let numerator = (i_hat.clone() * j_hat.clone()).mean_dim(1);
    let denominator = (i_hat.powf_scalar(2.0).mean_dim(1) * j_hat.powf_scalar(2.0).mean_dim(1) + NCC_EPSILON).sqrt();
    (numerator / denominator).reshape([b])
}

/// `1 - NCC` averaged over the batch; 0 for a perfect linear match.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalNCCLoss;

impl GlobalNCCLoss {
    pub fn new() -> Self {
        Self
    }

    pub fn forward<B: Backend>(&self, fixed: Tensor<B, 5>, warped: Tensor<B, 5>) -> Tensor<B, 1> {
        global_ncc(fixed, warped).mean().neg() + 1.0
    }
}
