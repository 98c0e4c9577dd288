use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor};

use crate::error::Result;
use crate::image::Image;
use crate::spatial::Spacing;

/// Separable Gaussian smoothing with sigmas in physical units.
///
/// `sigmas` are given per index axis `(x, y, z)`; a single value applies to every axis.
pub struct GaussianFilter<B: Backend> {
    sigmas: Vec<f64>,
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    pub fn new(sigmas: Vec<f64>) -> Self {
        Self {
            sigmas,
            max_kernel_width: 33,
            _b: std::marker::PhantomData,
        }
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Result<Image<B, D>> {
        let data = self.apply_tensor(image.data().clone(), image.spacing());
        image.with_data(data)
    }

    /// Smooth a tensor whose index axis `i` has spacing `spacing[i]`.
    pub fn apply_tensor<const D: usize>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        let mut data = input;
        let device = data.device();

        for dim in 0..D {
            // tensor dimension `dim` is index axis `D - 1 - dim`
            let axis = D - 1 - dim;
            let sigma = self.sigmas.get(axis).or(self.sigmas.first()).copied().unwrap_or(0.0);
            if sigma <= 1e-6 {
                continue;
            }

            let voxel_sigma = sigma / spacing[axis];
            let radius = (3.0 * voxel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width);
            let radius = (width - 1) / 2;
            if radius == 0 {
                continue;
            }

            let kernel = gaussian_kernel(voxel_sigma, radius);
            let kernel = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);
            data = convolve_along::<B, D>(data, kernel, dim);
        }
        data
    }
}

fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let values: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = values.iter().sum();
    values.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Zero-padded 1-D convolution along tensor dimension `dim`.
fn convolve_along<B: Backend, const D: usize>(input: Tensor<B, D>, kernel: Tensor<B, 1>, dim: usize) -> Tensor<B, D> {
    let dims: [usize; D] = input.dims();

    // move `dim` last, fold the rest into the batch
    let mut order = [0usize; D];
    let mut next = 0;
    for i in (0..D).filter(|&i| i != dim) {
        order[next] = i;
        next += 1;
    }
    order[D - 1] = dim;

    let length = dims[dim];
    let batch: usize = dims.iter().product::<usize>() / length;
    let permuted_shape: [usize; D] = std::array::from_fn(|i| dims[order[i]]);

    let kernel_size = kernel.dims()[0];
    let output = burn::tensor::module::conv1d(
        input.permute(order.map(|i| i as isize)).reshape([batch, 1, length]),
        kernel.reshape([1, 1, kernel_size]),
        None,
        ConvOptions::new([1], [kernel_size / 2], [1], 1),
    );

    let mut inverse = [0isize; D];
    for (new_pos, &old_pos) in order.iter().enumerate() {
        inverse[old_pos] = new_pos as isize;
    }
    output.reshape(Shape::new(permuted_shape)).permute(inverse)
}
