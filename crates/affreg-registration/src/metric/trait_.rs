//! Metric trait for image similarity measurement.

use affreg_core::image::{grid, Image};
use affreg_core::interpolation::{Interpolator, LinearInterpolator};
use affreg_core::transform::Transform;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Voxels mapped through the transform per batch.
pub const CHUNK_SIZE: usize = 32768;

/// Dissimilarity between a fixed image and a moving image seen through a transform.
///
/// The transform maps fixed world points to moving world points. Lower values mean
/// better alignment.
pub trait Metric<B: Backend, const D: usize> {
    /// Scalar loss of shape `[1]`.
    fn forward(
        &self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Tensor<B, 1>;

    fn name(&self) -> &'static str;
}

/// Moving intensities sampled at every fixed voxel, in fixed row-major voxel order.
///
/// Points are pushed through `index → world → transform → moving index` in chunks of
/// [`CHUNK_SIZE`] and interpolated trilinearly with border clamping.
pub fn sample_moving<B: Backend, const D: usize>(
    fixed: &Image<B, D>,
    moving: &Image<B, D>,
    transform: &impl Transform<B, D>,
) -> Tensor<B, 1> {
    let device = fixed.data().device();
    let indices = grid::generate_grid::<B, D>(fixed.shape(), &device);
    let [n, _] = indices.dims();
    let interpolator = LinearInterpolator::new();

    let mut sample = |chunk: Tensor<B, 2>| {
        let fixed_points = fixed.index_to_world_tensor(chunk);
        let moving_points = transform.transform_points(fixed_points);
        let moving_indices = moving.world_to_index_tensor(moving_points);
        interpolator.interpolate(moving.data(), moving_indices)
    };

    if n <= CHUNK_SIZE {
        return sample(indices);
    }

    let chunks: Vec<Tensor<B, 1>> = (0..n)
        .step_by(CHUNK_SIZE)
        .map(|start| {
            let len = CHUNK_SIZE.min(n - start);
            sample(indices.clone().narrow(0, start, len))
        })
        .collect();
    Tensor::cat(chunks, 0)
}

/// Fixed intensities flattened in the same order as [`sample_moving`].
pub fn fixed_values<B: Backend, const D: usize>(fixed: &Image<B, D>) -> Tensor<B, 1> {
    let n: usize = fixed.shape().iter().product();
    fixed.data().clone().reshape([n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use affreg_core::spatial::{Direction, Point, Spacing};
    use affreg_core::transform::AffineTransform;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity_sampling_reproduces_fixed() {
        let device = Default::default();
        let values: Vec<f32> = (0..4 * 5 * 6).map(|v| v as f32).collect();
        let data = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([4, 5, 6]);
        let image = Image::new(
            data,
            Point::new([2.0, -1.0, 3.0]),
            Spacing::new([1.5, 1.0, 2.0]),
            Direction::identity(),
        )
        .unwrap();
        let identity = AffineTransform::<TestBackend, 3>::identity(None, &device);

        let sampled = sample_moving(&image, &image, &identity).into_data().to_vec::<f32>().unwrap();
        let fixed = fixed_values(&image).into_data().to_vec::<f32>().unwrap();
        for (a, b) in sampled.iter().zip(&fixed) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }
}
