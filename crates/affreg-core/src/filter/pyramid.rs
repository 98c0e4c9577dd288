use burn::tensor::backend::Backend;

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;
use crate::error::{CoreError, Result};
use crate::image::Image;

/// Smoothed and decimated copies of an image, ordered as the schedules are given.
pub struct MultiResolutionPyramid<B: Backend, const D: usize> {
    images: Vec<Image<B, D>>,
}

impl<B: Backend, const D: usize> MultiResolutionPyramid<B, D> {
    /// Build a pyramid from per-level shrink factors and smoothing sigmas (in mm).
    pub fn new(input: &Image<B, D>, shrink_factors: &[Vec<usize>], smoothing_sigmas: &[Vec<f64>]) -> Result<Self> {
        if shrink_factors.len() != smoothing_sigmas.len() {
            return Err(CoreError::invalid_parameter(
                "smoothing_sigmas",
                format!(
                    "{} levels of sigmas for {} levels of shrink factors",
                    smoothing_sigmas.len(),
                    shrink_factors.len()
                ),
            ));
        }

        let images = shrink_factors
            .iter()
            .zip(smoothing_sigmas)
            .map(|(factors, sigmas)| {
                let smoothed = if sigmas.iter().all(|&s| s <= 1e-6) {
                    input.clone()
                } else {
                    GaussianFilter::new(sigmas.clone()).apply(input)?
                };
                if factors.iter().all(|&f| f <= 1) {
                    Ok(smoothed)
                } else {
                    DownsampleFilter::new(factors.clone()).apply(&smoothed)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { images })
    }

    pub fn get_level(&self, level: usize) -> Option<&Image<B, D>> {
        self.images.get(level)
    }

    pub fn levels(&self) -> usize {
        self.images.len()
    }

    /// Power-of-two schedule from coarsest to finest, e.g. 3 levels give factors
    /// `[4, 2, 1]` and sigmas `[2.0, 1.0, 0.0]`.
    pub fn default_schedule(levels: usize) -> (Vec<Vec<usize>>, Vec<Vec<f64>>) {
        (0..levels)
            .map(|i| {
                let factor = 2usize.pow((levels - 1 - i) as u32);
                let sigma = if factor > 1 { 0.5 * factor as f64 } else { 0.0 };
                (vec![factor; D], vec![sigma; D])
            })
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, Point, Spacing};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_default_schedule() {
        let (factors, sigmas) = MultiResolutionPyramid::<TestBackend, 3>::default_schedule(3);
        assert_eq!(factors, vec![vec![4; 3], vec![2; 3], vec![1; 3]]);
        assert_eq!(sigmas, vec![vec![2.0; 3], vec![1.0; 3], vec![0.0; 3]]);
    }

    #[test]
    fn test_pyramid_levels() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::ones([16, 16, 16], &device);
        let image = Image::new(data, Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap();
        let (factors, sigmas) = MultiResolutionPyramid::<TestBackend, 3>::default_schedule(3);

        let pyramid = MultiResolutionPyramid::new(&image, &factors, &sigmas).unwrap();
        assert_eq!(pyramid.levels(), 3);
        assert_eq!(pyramid.get_level(0).unwrap().shape(), [4, 4, 4]);
        assert_eq!(pyramid.get_level(2).unwrap().shape(), [16, 16, 16]);
        assert!(pyramid.get_level(3).is_none());

        assert!(MultiResolutionPyramid::new(&image, &factors, &sigmas[..1]).is_err());
    }
}
