//! Affine spatial transformer: sampling grids from grid thetas and warping volumes.

use affreg_core::image::{Image, VolumeGeometry};
use affreg_core::transform::convention::{theta_to_row_major, THETA_LEN};
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::Matrix3x4;

use crate::interpolation::{grid_sample_3d, PaddingMode};

/// Corner-aligned coordinates in `[-1, 1]`; a single sample sits at 0.
fn linspace<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 1> {
    if n < 2 {
        return Tensor::zeros([n], device);
    }
    Tensor::arange(0..n as i64, device).float() * (2.0 / (n - 1) as f64) - 1.0
}

/// Homogeneous normalised coordinates `(x, y, z, 1)` of every voxel, `[4, D*H*W]` with
/// x varying fastest.
fn base_grid<B: Backend>([d, h, w]: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let n = d * h * w;
    let x = linspace::<B>(w, device).reshape([1, 1, w]).repeat(&[d, h, 1]);
    let y = linspace::<B>(h, device).reshape([1, h, 1]).repeat(&[d, 1, w]);
    let z = linspace::<B>(d, device).reshape([d, 1, 1]).repeat(&[1, h, w]);
    let ones = Tensor::<B, 2>::ones([1, n], device);

    Tensor::cat(vec![x.reshape([1, n]), y.reshape([1, n]), z.reshape([1, n]), ones], 0)
}

/// Sampling grid `[B, 3, D, H, W]` of normalised input coordinates for the output
/// shape `[D, H, W]`, from `[B, 12]` row-major thetas.
pub fn affine_grid<B: Backend>(theta: Tensor<B, 2>, shape: [usize; 3]) -> Tensor<B, 5> {
    let [b, _] = theta.dims();
    let [d, h, w] = shape;
    let device = theta.device();

    let theta = theta.reshape([b, 3, 4]);
    let base = base_grid::<B>(shape, &device).unsqueeze::<3>().repeat(&[b, 1, 1]);
    theta.matmul(base).reshape([b, 3, d, h, w])
}

/// Stack thetas into a `[B, 12]` tensor.
pub fn theta_batch<B: Backend>(thetas: &[Matrix3x4<f64>], device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = thetas.iter().flat_map(theta_to_row_major).collect();
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([thetas.len(), THETA_LEN])
}

/// Warps volumes through grid thetas with trilinear sampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineSpatialTransformer {
    padding: PaddingMode,
}

impl AffineSpatialTransformer {
    pub fn new(padding: PaddingMode) -> Self {
        Self { padding }
    }

    pub fn padding(&self) -> PaddingMode {
        self.padding
    }

    /// Warp `[B, C, D, H, W]` volumes onto a grid of the same shape.
    pub fn forward<B: Backend>(&self, image: Tensor<B, 5>, theta: Tensor<B, 2>) -> Tensor<B, 5> {
        let [_, _, d, h, w] = image.dims();
        self.forward_to_shape(image, theta, [d, h, w])
    }

    /// Warp `[B, C, D, H, W]` volumes onto an output grid of `shape` (`[D', H', W']`).
    pub fn forward_to_shape<B: Backend>(&self, image: Tensor<B, 5>, theta: Tensor<B, 2>, shape: [usize; 3]) -> Tensor<B, 5> {
        let grid = affine_grid(theta, shape);
        grid_sample_3d(image, grid, self.padding)
    }

    /// Resample `image` onto the `output` geometry; `theta` maps normalised output
    /// coordinates to normalised coordinates of `image`.
    pub fn warp_image<B: Backend>(
        &self,
        image: &Image<B, 3>,
        theta: &Matrix3x4<f64>,
        output: &VolumeGeometry,
    ) -> Result<Image<B, 3>> {
        let device = image.data().device();
        let [d, h, w] = image.shape();
        let shape = output.shape();

        let input = image.data().clone().reshape([1, 1, d, h, w]);
        let warped = self.forward_to_shape(input, theta_batch::<B>(&[*theta], &device), shape);
        Image::from_geometry(warped.reshape(shape), output).context("Invalid output geometry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affreg_core::transform::convention::identity_theta;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_identity_reproduces_input() {
        let device = Default::default();
        let image = Tensor::<B, 5>::random([2, 1, 5, 6, 7], Distribution::Normal(0.0, 1.0), &device);
        let theta = theta_batch::<B>(&[identity_theta(), identity_theta()], &device);

        for padding in [PaddingMode::Zeros, PaddingMode::Border] {
            let out = AffineSpatialTransformer::new(padding).forward(image.clone(), theta.clone());
            for (a, b) in values(out).iter().zip(values(image.clone())) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_translation_by_one_voxel() {
        let device = Default::default();
        let w = 5;
        let ramp: Vec<f32> = (0..3 * 4 * w).map(|i| (i % w) as f32).collect();
        let image = Tensor::<B, 1>::from_floats(ramp.as_slice(), &device).reshape([1, 1, 3, 4, w]);

        let mut theta = identity_theta();
        theta[(0, 3)] = 2.0 / (w - 1) as f64;
        let out = AffineSpatialTransformer::new(PaddingMode::Border)
            .forward(image, theta_batch::<B>(&[theta], &device));

        // output voxel x samples input voxel x + 1, clamped at the border
        let out = values(out);
        assert_eq!(&out[..w], &[1.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_grid_layout() {
        let device = Default::default();
        let theta = theta_batch::<B>(&[identity_theta()], &device);
        let grid = values(affine_grid(theta, [2, 2, 3]));
        // x channel over the first row, then y and z channels start at -1
        assert_eq!(&grid[..3], &[-1.0, 0.0, 1.0]);
        assert_eq!(grid[12], -1.0);
        assert_eq!(grid[24], -1.0);
        assert_eq!(grid[35], 1.0);
    }

    #[test]
    fn test_gradient_flows_to_theta() {
        use burn::backend::Autodiff;
        type AD = Autodiff<NdArray<f32>>;

        let device = Default::default();
        let ramp: Vec<f32> = (0..4 * 4 * 4).map(|i| (i % 4) as f32).collect();
        let image = Tensor::<AD, 1>::from_floats(ramp.as_slice(), &device).reshape([1, 1, 4, 4, 4]);
        let theta = theta_batch::<AD>(&[identity_theta()], &device).require_grad();

        let out = AffineSpatialTransformer::new(PaddingMode::Border).forward(image, theta.clone());
        let grads = out.sum().backward();
        let grad = theta.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        assert!(grad[3].abs() > 0.0, "x translation gets no gradient");
    }
}
