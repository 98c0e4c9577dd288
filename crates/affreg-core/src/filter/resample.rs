//! Resampling of an image onto another grid through a transform.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::error::Result;
use crate::image::{generate_grid, Image};
use crate::interpolation::trait_::Interpolator;
use crate::spatial::{Direction, Point, Spacing};
use crate::transform::trait_::Transform;

/// Resamples an image onto an output grid.
///
/// For every output voxel the transform maps its physical position into the input
/// image, where the interpolator reads the value. The transform therefore maps
/// Output Physical Space -> Input Physical Space, i.e. fixed to moving for a
/// registration result.
pub struct ResampleImageFilter<B, T, I, const D: usize>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    size: [usize; D],
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    transform: T,
    interpolator: I,
    _phantom: PhantomData<B>,
}

impl<B, T, I, const D: usize> ResampleImageFilter<B, T, I, D>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    /// # Arguments
    /// * `size` - Output tensor shape (`[z, y, x]` for volumes)
    /// * `origin`, `spacing`, `direction` - Output physical metadata
    /// * `transform` - Transform from output space to input space
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(
        size: [usize; D],
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
        transform: T,
        interpolator: I,
    ) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction,
            transform,
            interpolator,
            _phantom: PhantomData,
        }
    }

    /// Use the grid (size, origin, spacing, direction) of a reference image.
    pub fn new_from_reference(reference: &Image<B, D>, transform: T, interpolator: I) -> Self {
        Self::new(
            reference.shape(),
            *reference.origin(),
            *reference.spacing(),
            *reference.direction(),
            transform,
            interpolator,
        )
    }

    pub fn apply(&self, input: &Image<B, D>) -> Result<Image<B, D>> {
        let device = input.data().device();

        let output_indices = generate_grid::<B, D>(self.size, &device);
        let output_points = self.indices_to_physical(output_indices, &device);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);

        let values = self.interpolator.interpolate(input.data(), input_indices);
        let data = values.reshape(Shape::new(self.size));

        Image::new(data, self.origin, self.spacing, self.direction)
    }

    fn indices_to_physical(&self, indices: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        // point = origin + Direction * (index * spacing), as row vectors
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        let origin = Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D]);

        let mut m = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m, Shape::new([D, D])), device);

        indices.matmul(m) + origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::LinearInterpolator;
    use crate::transform::AffineTransform;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resample_translation_2d() {
        let device = Default::default();

        // 2x2 square at (4..=5, 4..=5) in a 10x10 image
        let mut data = vec![0.0f32; 100];
        for (y, x) in [(4, 4), (4, 5), (5, 4), (5, 5)] {
            data[y * 10 + x] = 1.0;
        }
        let tensor = Tensor::<TestBackend, 2>::from_data(TensorData::new(data, Shape::new([10, 10])), &device);
        let image = Image::new(tensor, Point::new([0.0, 0.0]), Spacing::new([1.0, 1.0]), Direction::identity()).unwrap();

        // output (x, y) reads input (x - 2, y - 1): content moves by (+2, +1)
        let transform = AffineTransform::<TestBackend, 2>::new(
            Tensor::eye(2, &device),
            Tensor::from_floats([-2.0, -1.0], &device),
            Tensor::zeros([2], &device),
        );
        let filter = ResampleImageFilter::new_from_reference(&image, transform, LinearInterpolator::new());
        let result = filter.apply(&image).unwrap();

        let out = result.data().clone().into_data().to_vec::<f32>().unwrap();
        for idx in [56, 57, 66, 67] {
            assert!(out[idx] > 0.9, "voxel {idx} = {}", out[idx]);
        }
        assert!(out[44] < 0.1);
    }

    #[test]
    fn test_resample_onto_coarser_grid() {
        let device = Default::default();
        // value equals the physical x coordinate
        let values: Vec<f32> = (0..4 * 4 * 9).map(|i| (i % 9) as f32).collect();
        let tensor = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([4, 4, 9]);
        let image = Image::new(tensor, Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap();

        let filter = ResampleImageFilter::new(
            [2, 2, 5],
            Point::origin(),
            Spacing::new([2.0, 3.0, 3.0]),
            Direction::identity(),
            AffineTransform::<TestBackend, 3>::identity(None, &device),
            LinearInterpolator::new(),
        );
        let out = filter.apply(&image).unwrap();
        assert_eq!(out.shape(), [2, 2, 5]);
        let row = out.data().clone().slice([0..1, 0..1, 0..5]).into_data().to_vec::<f32>().unwrap();
        assert_eq!(row, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }
}
