//! Random affine perturbations with known ground truth.
//!
//! A perturbation is drawn as [`AffineParameters`] about the centre of the moving volume.
//! Its world matrix `M` resamples the moving volume (`moving'(x) = moving(M x)`), so the
//! transform that maps fixed points back into the perturbed moving volume is `M⁻¹`; its
//! grid theta is the regression target.

use affreg_core::image::{Image, VolumeGeometry};
use affreg_core::transform::convention::{invert_theta, world_to_theta};
use affreg_core::transform::AffineParameters;
use anyhow::{bail, Context, Result};
use burn::config::Config;
use burn::tensor::backend::Backend;
use nalgebra::{Matrix3x4, Matrix4};
use rand::Rng;

use crate::affine::AffineSpatialTransformer;
use crate::interpolation::PaddingMode;

/// Ranges of the random perturbation.
#[derive(Config, Debug)]
pub struct RandomAffineConfig {
    /// Scale factors are drawn uniformly from `[min, max]`.
    #[config(default = "(0.9, 1.1)")]
    pub scales: (f64, f64),
    /// Rotation angles about each axis are drawn from `[-degrees, degrees]`.
    #[config(default = 10.0)]
    pub degrees: f64,
    /// Translations along each axis are drawn from `[-translation, translation]` mm.
    #[config(default = 10.0)]
    pub translation: f64,
    /// One scale factor for all axes.
    #[config(default = false)]
    pub isotropic: bool,
}

impl RandomAffineConfig {
    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.scales;
        if !(min > 0.0 && min <= max && max.is_finite()) {
            bail!("Scale range must satisfy 0 < min <= max, got ({min}, {max})");
        }
        if !(self.degrees >= 0.0 && self.degrees < 180.0) {
            bail!("Rotation range must be in [0, 180) degrees, got {}", self.degrees);
        }
        if !(self.translation >= 0.0 && self.translation.is_finite()) {
            bail!("Translation range must be non-negative, got {}", self.translation);
        }
        Ok(())
    }

    /// A config that always yields the identity.
    pub fn none() -> Self {
        Self::new().with_scales((1.0, 1.0)).with_degrees(0.0).with_translation(0.0)
    }
}

/// Sampler of random affine parameters.
#[derive(Debug, Clone)]
pub struct RandomAffine {
    config: RandomAffineConfig,
}

impl RandomAffine {
    pub fn new(config: RandomAffineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RandomAffineConfig {
        &self.config
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> AffineParameters {
        let (min, max) = self.config.scales;
        let scales = if self.config.isotropic {
            [rng.random_range(min..=max); 3]
        } else {
            std::array::from_fn(|_| rng.random_range(min..=max))
        };
        let d = self.config.degrees;
        let t = self.config.translation;

        AffineParameters {
            scales,
            degrees: std::array::from_fn(|_| rng.random_range(-d..=d)),
            translation: std::array::from_fn(|_| rng.random_range(-t..=t)),
        }
    }
}

/// A sampled perturbation in both conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    pub params: AffineParameters,
    /// World matrix applied to the moving volume.
    pub world: Matrix4<f64>,
    /// Grid theta that produces the perturbed moving volume from the moving volume.
    pub theta: Matrix3x4<f64>,
    /// Grid theta from the fixed grid into the perturbed moving volume; what the
    /// network should predict.
    pub target: Matrix3x4<f64>,
    moving: VolumeGeometry,
}

impl Perturbation {
    /// Perturb a volume registered to itself.
    pub fn new(params: AffineParameters, geometry: &VolumeGeometry) -> Result<Self> {
        let world = params.to_matrix(&geometry.center());
        let theta = world_to_theta(&world, geometry, geometry)?;
        let target = invert_theta(&theta)?;
        Ok(Self {
            params,
            world,
            theta,
            target,
            moving: *geometry,
        })
    }

    /// Perturb the moving volume of a pair whose fixed volume lives on another grid.
    pub fn for_pair(params: AffineParameters, fixed: &VolumeGeometry, moving: &VolumeGeometry) -> Result<Self> {
        let world = params.to_matrix(&moving.center());
        let theta = world_to_theta(&world, moving, moving)?;
        let inverse = world
            .try_inverse()
            .context("Perturbation world matrix is singular")?;
        let target = world_to_theta(&inverse, fixed, moving)?;
        Ok(Self {
            params,
            world,
            theta,
            target,
            moving: *moving,
        })
    }

    /// World matrix from fixed points to points of the perturbed moving volume.
    pub fn target_world(&self) -> Result<Matrix4<f64>> {
        self.world.try_inverse().context("Perturbation world matrix is singular")
    }

    /// Resample the moving volume through the perturbation, keeping its geometry.
    pub fn apply<B: Backend>(&self, moving: &Image<B, 3>, padding: PaddingMode) -> Result<Image<B, 3>> {
        AffineSpatialTransformer::new(padding).warp_image(moving, &self.theta, &self.moving)
    }
}
