//! Linear interpolation for 2-D and 3-D data.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use super::trait_::Interpolator;

/// Bilinear (2-D) or trilinear (3-D) interpolation.
///
/// Indices outside the grid are clamped to the border voxels.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.shape().dims;
        match D {
            3 => Self::interpolate_3d(data.clone().reshape([dims[0], dims[1], dims[2]]), indices),
            2 => {
                // a 2-D image is a volume of depth one sampled at z = 0
                let n = indices.dims()[0];
                let volume = data.clone().reshape([1, dims[0], dims[1]]);
                let z = Tensor::<B, 2>::zeros([n, 1], &indices.device());
                Self::interpolate_3d(volume, Tensor::cat(vec![indices, z], 1))
            }
            _ => panic!("LinearInterpolator supports 2D and 3D tensors, got {D}D"),
        }
    }
}

impl LinearInterpolator {
    fn interpolate_3d<B: Backend>(data: Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();
        let wz = z - z0.clone();

        let clamp = |t: Tensor<B, 1>, size: usize| t.clamp(0.0, (size - 1) as f64).int();
        let x1_i = clamp(x0.clone() + 1.0, d2);
        let y1_i = clamp(y0.clone() + 1.0, d1);
        let z1_i = clamp(z0.clone() + 1.0, d0);
        let x0_i = clamp(x0, d2);
        let y0_i = clamp(y0, d1);
        let z0_i = clamp(z0, d0);

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;
        let flat = data.reshape([d0 * d1 * d2]);
        let gather = |xi: &Tensor<B, 1, Int>, yi: &Tensor<B, 1, Int>, zi: &Tensor<B, 1, Int>| {
            let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
            flat.clone().gather(0, idx)
        };

        let v000 = gather(&x0_i, &y0_i, &z0_i);
        let v001 = gather(&x0_i, &y0_i, &z1_i);
        let v010 = gather(&x0_i, &y1_i, &z0_i);
        let v011 = gather(&x0_i, &y1_i, &z1_i);
        let v100 = gather(&x1_i, &y0_i, &z0_i);
        let v101 = gather(&x1_i, &y0_i, &z1_i);
        let v110 = gather(&x1_i, &y1_i, &z0_i);
        let v111 = gather(&x1_i, &y1_i, &z1_i);

        let one_minus_wx = wx.clone().neg() + 1.0;
        let one_minus_wy = wy.clone().neg() + 1.0;
        let one_minus_wz = wz.clone().neg() + 1.0;

        // along x
        let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
        let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
        let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
        let c11 = v011 * one_minus_wx + v111 * wx;

        // along y
        let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
        let c1 = c01 * one_minus_wy + c11 * wy;

        // along z
        c0 * one_minus_wz + c1 * wz
    }
}
