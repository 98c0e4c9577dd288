//! Errors of an estimated affine against the known perturbation.

use affreg_core::image::VolumeGeometry;
use affreg_core::spatial::Point;
use affreg_core::transform::{mean_point_distance, world_to_theta, AffineParameters};
use anyhow::{Context, Result};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

/// How far an estimated world matrix is from the true one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformErrors {
    /// Frobenius norm of the difference of the grid thetas.
    pub theta_error: f64,
    /// Mean distance (mm) over the fixed corners and centre.
    pub tre_mm: f64,
    /// Rotation angle of the residual transform.
    pub rotation_error_deg: f64,
    /// Translation of the residual transform about the fixed centre.
    pub translation_error_mm: f64,
    /// Largest deviation of a residual scale factor from 1.
    pub scale_error: f64,
}

/// Landmarks for the target registration error.
pub fn landmarks(fixed: &VolumeGeometry) -> Vec<Point<3>> {
    let mut points = fixed.corners();
    points.push(fixed.center());
    points
}

/// Compare `estimated` with `truth`, both mapping fixed points to moving points.
pub fn transform_errors(
    estimated: &Matrix4<f64>,
    truth: &Matrix4<f64>,
    fixed: &VolumeGeometry,
    moving: &VolumeGeometry,
) -> Result<TransformErrors> {
    let theta_error = (world_to_theta(estimated, fixed, moving)? - world_to_theta(truth, fixed, moving)?).norm();
    let tre_mm = mean_point_distance(estimated, truth, &landmarks(fixed));

    let residual = truth.try_inverse().context("True transform is singular")? * estimated;
    let params = AffineParameters::from_matrix(&residual, &fixed.center()).context("Residual transform is singular")?;

    let rotation = params.rotation();
    let cos_angle = ((rotation.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
    let scale_error = params.scales.iter().fold(0.0_f64, |acc, s| acc.max((s.abs() - 1.0).abs()));

    Ok(TransformErrors {
        theta_error,
        tre_mm,
        rotation_error_deg: cos_angle.acos().to_degrees(),
        translation_error_mm: params.translation_norm(),
        scale_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use affreg_core::spatial::{Direction, Spacing};

    fn geometry() -> VolumeGeometry {
        VolumeGeometry::new(
            [16, 16, 16],
            Point::new([-15.0, -15.0, -15.0]),
            Spacing::uniform(2.0),
            Direction::identity(),
        )
    }

    #[test]
    fn test_exact_estimate_has_no_error() {
        let geom = geometry();
        let truth = AffineParameters {
            scales: [1.1, 0.9, 1.0],
            degrees: [5.0, -3.0, 7.0],
            translation: [2.0, 1.0, -4.0],
        }
        .to_matrix(&geom.center());

        let errors = transform_errors(&truth, &truth, &geom, &geom).unwrap();
        assert!(errors.theta_error < 1e-9);
        assert!(errors.tre_mm < 1e-9);
        assert!(errors.rotation_error_deg < 1e-4);
        assert!(errors.translation_error_mm < 1e-9);
        assert!(errors.scale_error < 1e-9);
    }

    #[test]
    fn test_translation_offset() {
        let geom = geometry();
        let truth = Matrix4::identity();
        let estimated = Matrix4::new_translation(&nalgebra::Vector3::new(3.0, 0.0, 4.0));

        let errors = transform_errors(&estimated, &truth, &geom, &geom).unwrap();
        assert!((errors.tre_mm - 5.0).abs() < 1e-9);
        assert!((errors.translation_error_mm - 5.0).abs() < 1e-9);
        assert!(errors.rotation_error_deg < 1e-6);
        assert!(errors.theta_error > 0.0);
    }

    #[test]
    fn test_rotation_error_is_residual_angle() {
        let geom = geometry();
        let center = geom.center();
        let rotated = |deg: f64| {
            AffineParameters {
                degrees: [0.0, 0.0, deg],
                ..AffineParameters::identity()
            }
            .to_matrix(&center)
        };

        let errors = transform_errors(&rotated(12.0), &rotated(2.0), &geom, &geom).unwrap();
        assert!((errors.rotation_error_deg - 10.0).abs() < 1e-6);
        assert!(errors.translation_error_mm < 1e-9);
        assert!(errors.scale_error < 1e-9);
    }
}
