use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::error::Result;
use crate::image::Image;

/// Integer-factor decimation that keeps every n-th voxel starting at index 0.
///
/// `factors` are per index axis `(x, y, z)`. The origin is unchanged and the spacing is
/// multiplied by the factor.
pub struct DownsampleFilter<B: Backend> {
    factors: Vec<usize>,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> DownsampleFilter<B> {
    pub fn new(factors: Vec<usize>) -> Self {
        Self {
            factors,
            _b: std::marker::PhantomData,
        }
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Result<Image<B, D>> {
        let mut data = image.data().clone();
        let device = data.device();
        let dims: [usize; D] = data.dims();
        let mut spacing = *image.spacing();

        for dim in 0..D {
            let axis = D - 1 - dim;
            let factor = self.factors.get(axis).or(self.factors.first()).copied().unwrap_or(1);
            if factor <= 1 || dims[dim] <= 1 {
                continue;
            }

            let keep: Vec<i32> = (0..dims[dim]).step_by(factor).map(|i| i as i32).collect();
            data = data.select(dim, Tensor::<B, 1, Int>::from_ints(keep.as_slice(), &device));
            spacing[axis] *= factor as f64;
        }

        Image::new(data, *image.origin(), spacing, *image.direction())
    }
}
