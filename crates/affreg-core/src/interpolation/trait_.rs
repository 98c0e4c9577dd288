//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples image values at non-integer voxel indices.
pub trait Interpolator<B: Backend> {
    /// Interpolate values from a tensor at given continuous indices.
    ///
    /// # Arguments
    /// * `data` - The source tensor (`[Z, Y, X]` volume or `[Y, X]` image)
    /// * `indices` - `[Batch, D]` continuous indices ordered `(x, y, ...)`
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
