//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps points from one physical space to another.
///
/// Registration transforms map points of the fixed image to the moving image, so a
/// warped image is produced by sampling the moving image at the transformed fixed grid.
/// The trait does not require `burn::module::Module`, so pure transforms work as well
/// as trainable ones.
pub trait Transform<B: Backend, const D: usize> {
    /// Apply transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, D]` containing the input points
    ///
    /// # Returns
    /// Tensor of shape `[Batch, D]` containing the transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
