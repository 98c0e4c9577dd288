//! Differentiable trilinear sampling of batched volumes.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

/// Value returned for sample points outside the input volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingMode {
    /// Out-of-volume neighbours contribute zero.
    #[default]
    Zeros,
    /// Coordinates are clamped to the volume, repeating the border voxels.
    Border,
}

/// Sample `image` at the normalised coordinates in `grid`.
///
/// * `image` - `[B, C, D, H, W]`
/// * `grid` - `[B, 3, D', H', W']`; channel 0 is x (along W), 1 is y, 2 is z, each in
///   `[-1, 1]` with -1 and +1 at the centres of the first and last voxel.
///
/// Returns `[B, C, D', H', W']`, differentiable with respect to both inputs.
pub fn grid_sample_3d<B: Backend>(image: Tensor<B, 5>, grid: Tensor<B, 5>, padding: PaddingMode) -> Tensor<B, 5> {
    let [b, c, d, h, w] = image.dims();
    let [_, _, od, oh, ow] = grid.dims();
    let n = od * oh * ow;

    let to_index = |t: Tensor<B, 5>, size: usize| -> Tensor<B, 5> {
        let t = (t + 1.0) * ((size.saturating_sub(1)) as f64 / 2.0);
        match padding {
            PaddingMode::Border => t.clamp(0.0, size.saturating_sub(1) as f64),
            PaddingMode::Zeros => t,
        }
    };
    let x = to_index(grid.clone().narrow(1, 0, 1), w);
    let y = to_index(grid.clone().narrow(1, 1, 1), h);
    let z = to_index(grid.narrow(1, 2, 1), d);

    let x0 = x.clone().floor();
    let y0 = y.clone().floor();
    let z0 = z.clone().floor();
    let x1 = x0.clone() + 1.0;
    let y1 = y0.clone() + 1.0;
    let z1 = z0.clone() + 1.0;

    let wx1 = x - x0.clone();
    let wy1 = y - y0.clone();
    let wz1 = z - z0.clone();
    let wx0 = wx1.clone().neg() + 1.0;
    let wy0 = wy1.clone().neg() + 1.0;
    let wz0 = wz1.clone().neg() + 1.0;

    let flat = image.reshape([b, c, d * h * w]);
    let stride_z = (h * w) as i32;
    let stride_y = w as i32;

    let clamp_index = |t: &Tensor<B, 5>, size: usize| -> Tensor<B, 5, Int> {
        t.clone().clamp(0.0, (size - 1) as f64).int()
    };
    let inside = |t: &Tensor<B, 5>, size: usize| -> Tensor<B, 5> {
        let lower = t.clone().greater_equal_elem(0.0).float();
        let upper = t.clone().lower_equal_elem((size - 1) as f64).float();
        lower * upper
    };

    let corner = |xi: &Tensor<B, 5>, yi: &Tensor<B, 5>, zi: &Tensor<B, 5>| -> Tensor<B, 5> {
        let index = clamp_index(zi, d).mul_scalar(stride_z)
            + clamp_index(yi, h).mul_scalar(stride_y)
            + clamp_index(xi, w);
        let index = index.reshape([b, 1, n]).repeat(&[1, c, 1]);
        let values = flat.clone().gather(2, index).reshape([b, c, od, oh, ow]);
        match padding {
            PaddingMode::Border => values,
            PaddingMode::Zeros => values * (inside(xi, w) * inside(yi, h) * inside(zi, d)),
        }
    };

    // along x
    let c00 = corner(&x0, &y0, &z0) * wx0.clone() + corner(&x1, &y0, &z0) * wx1.clone();
    let c10 = corner(&x0, &y1, &z0) * wx0.clone() + corner(&x1, &y1, &z0) * wx1.clone();
    let c01 = corner(&x0, &y0, &z1) * wx0.clone() + corner(&x1, &y0, &z1) * wx1.clone();
    let c11 = corner(&x0, &y1, &z1) * wx0 + corner(&x1, &y1, &z1) * wx1;

    // along y
    let c0 = c00 * wy0.clone() + c10 * wy1.clone();
    let c1 = c01 * wy0 + c11 * wy1;

    // along z
    c0 * wz0 + c1 * wz1
}
