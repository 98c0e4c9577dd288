//! Conversions between the two affine conventions used throughout the workspace.
//!
//! * **World matrix**: a homogeneous 4×4 matrix in millimetres that maps a point of the
//!   *output* volume to the point of the *input* volume that is sampled there. Random
//!   perturbations and classical registration results live in this convention.
//! * **Grid theta**: a 3×4 matrix acting on corner-aligned normalised output coordinates
//!   `(x, y, z, 1)`, each component in `[-1, 1]`, yielding normalised input coordinates.
//!   The spatial transformer and the network output live in this convention.
//!
//! With `W` the index → world matrix and `N` the normalised → index matrix of a
//! [`VolumeGeometry`]:
//!
//! ```text
//! θ = N_in⁻¹ · W_in⁻¹ · M · W_out · N_out
//! M = W_in · N_in · θ · N_out⁻¹ · W_out⁻¹
//! ```

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3 as NaVector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::image::VolumeGeometry;
use crate::spatial::Point;

/// Number of values in a flattened grid theta.
pub const THETA_LEN: usize = 12;

/// Convert a world matrix into the grid theta between two volumes.
pub fn world_to_theta(
    world: &Matrix4<f64>,
    output: &VolumeGeometry,
    input: &VolumeGeometry,
) -> Result<Matrix3x4<f64>> {
    let out_n2w = output.index_to_world() * output.normalized_to_index()?;
    let in_w2n = input.index_to_normalized()? * input.world_to_index()?;
    let theta = in_w2n * world * out_n2w;
    Ok(theta.fixed_view::<3, 4>(0, 0).into_owned())
}

/// Convert a grid theta back into the world matrix between two volumes.
pub fn theta_to_world(
    theta: &Matrix3x4<f64>,
    output: &VolumeGeometry,
    input: &VolumeGeometry,
) -> Result<Matrix4<f64>> {
    let in_n2w = input.index_to_world() * input.normalized_to_index()?;
    let out_w2n = output.index_to_normalized()? * output.world_to_index()?;
    Ok(in_n2w * theta_to_homogeneous(theta) * out_w2n)
}

/// Append the `[0, 0, 0, 1]` row.
pub fn theta_to_homogeneous(theta: &Matrix3x4<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 4>(0, 0).copy_from(theta);
    m
}

/// Theta of the inverse mapping.
pub fn invert_theta(theta: &Matrix3x4<f64>) -> Result<Matrix3x4<f64>> {
    let inverse = theta_to_homogeneous(theta)
        .try_inverse()
        .ok_or_else(|| CoreError::singular("theta"))?;
    Ok(inverse.fixed_view::<3, 4>(0, 0).into_owned())
}

pub fn identity_theta() -> Matrix3x4<f64> {
    Matrix3x4::identity()
}

/// Read a theta from 12 row-major values, the layout produced by the network.
pub fn theta_from_row_major(values: &[f32]) -> Result<Matrix3x4<f64>> {
    if values.len() != THETA_LEN {
        return Err(CoreError::ShapeMismatch {
            expected: vec![THETA_LEN],
            actual: vec![values.len()],
        });
    }
    Ok(Matrix3x4::from_fn(|r, c| values[r * 4 + c] as f64))
}

pub fn theta_to_row_major(theta: &Matrix3x4<f64>) -> [f32; THETA_LEN] {
    std::array::from_fn(|i| theta[(i / 4, i % 4)] as f32)
}

/// Apply a homogeneous matrix to a point.
pub fn transform_point(m: &Matrix4<f64>, point: &Point<3>) -> Point<3> {
    Point(m.transform_point(&point.0))
}

/// Mean distance between the images of `points` under two world matrices.
///
/// With `a` the estimated and `b` the true transform this is the target registration
/// error over `points`. Returns 0 for an empty point set.
pub fn mean_point_distance(a: &Matrix4<f64>, b: &Matrix4<f64>, points: &[Point<3>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let total: f64 = points
        .iter()
        .map(|p| transform_point(a, p).distance(&transform_point(b, p)))
        .sum();
    total / points.len() as f64
}

/// Scale, rotation and translation parameters of a world matrix about a centre.
///
/// `M = T(c + t) · Rz(γ) · Ry(β) · Rx(α) · S · T(-c)` with `(α, β, γ)` the `degrees`
/// about x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineParameters {
    pub scales: [f64; 3],
    pub degrees: [f64; 3],
    pub translation: [f64; 3],
}

impl Default for AffineParameters {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineParameters {
    pub fn identity() -> Self {
        Self {
            scales: [1.0; 3],
            degrees: [0.0; 3],
            translation: [0.0; 3],
        }
    }

    /// Rotation matrix `Rz · Ry · Rx`.
    pub fn rotation(&self) -> Matrix3<f64> {
        let [a, b, g] = self.degrees.map(f64::to_radians);
        let (sx, cx) = a.sin_cos();
        let (sy, cy) = b.sin_cos();
        let (sz, cz) = g.sin_cos();

        let rx = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
        let ry = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
        let rz = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);
        rz * ry * rx
    }

    /// World matrix of these parameters about `center`.
    pub fn to_matrix(&self, center: &Point<3>) -> Matrix4<f64> {
        let linear = self.rotation() * Matrix3::from_diagonal(&NaVector3::from(self.scales));
        let c = center.0.coords;
        let offset = c + NaVector3::from(self.translation) - linear * c;

        let mut m = linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        m
    }

    /// Decompose a world matrix about `center`, assuming it carries no shear.
    ///
    /// Scales are the column norms of the linear part; a reflection is folded into a
    /// negative x scale. At gimbal lock (`|β| = 90°`) the z angle is set to zero.
    pub fn from_matrix(m: &Matrix4<f64>, center: &Point<3>) -> Result<Self> {
        let linear: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let mut scales = [0.0; 3];
        for (i, scale) in scales.iter_mut().enumerate() {
            *scale = linear.column(i).norm();
            if *scale < 1e-12 {
                return Err(CoreError::singular("affine linear part"));
            }
        }
        if linear.determinant() < 0.0 {
            scales[0] = -scales[0];
        }
        let r = linear * Matrix3::from_diagonal(&NaVector3::from(scales.map(|s| 1.0 / s)));

        let sin_beta = (-r[(2, 0)]).clamp(-1.0, 1.0);
        let beta = sin_beta.asin();
        let (alpha, gamma) = if beta.cos() > 1e-6 {
            (r[(2, 1)].atan2(r[(2, 2)]), r[(1, 0)].atan2(r[(0, 0)]))
        } else {
            ((-r[(1, 2)]).atan2(r[(1, 1)]), 0.0)
        };

        let c = center.0.coords;
        let offset: NaVector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
        let t = offset + linear * c - c;

        Ok(Self {
            scales,
            degrees: [alpha, beta, gamma].map(f64::to_degrees),
            translation: [t.x, t.y, t.z],
        })
    }

    /// Largest absolute rotation angle in degrees.
    pub fn max_abs_degrees(&self) -> f64 {
        self.degrees.iter().fold(0.0, |acc, d| acc.max(d.abs()))
    }

    /// Euclidean norm of the translation in millimetres.
    pub fn translation_norm(&self) -> f64 {
        NaVector3::from(self.translation).norm()
    }
}
