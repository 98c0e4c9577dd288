//! Runs the learned predictor and the classical baseline on the same perturbations.

use std::sync::Arc;
use std::time::Instant;

use affreg_core::image::Image;
use affreg_core::transform::{world_to_theta, AffineParameters, AffineTransform};
use affreg_io::LoadedPair;
use affreg_model::io::image_to_tensor;
use affreg_model::losses::global_ncc;
use affreg_model::{AffinePredictor, AffineSpatialTransformer, PaddingMode, Perturbation, RandomAffine};
use affreg_registration::{
    AdamOptimizer, MeanSquaredError, Metric, MultiResolutionRegistration, NormalizedCrossCorrelation,
    ProgressCallback, ProgressTracker, RegistrationSchedule,
};
use anyhow::{Context, Result};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use nalgebra::Matrix4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::{BenchmarkConfig, ClassicalConfig, SimilarityMetric};
use crate::metrics::transform_errors;
use crate::report::{BenchmarkReport, CaseResult, MethodResult};

/// Copy of an image on the inner (non-autodiff) backend.
fn inner_image<B: AutodiffBackend>(image: &Image<B, 3>) -> Result<Image<B::InnerBackend, 3>> {
    Image::from_geometry(image.data().clone().inner(), &image.geometry()).context("Invalid image geometry")
}

fn register_with<B, M>(
    metric: M,
    classical: &ClassicalConfig,
    schedule: &RegistrationSchedule<3>,
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    transform: AffineTransform<B, 3>,
) -> Result<AffineTransform<B, 3>>
where
    B: AutodiffBackend,
    M: Metric<B, 3> + Clone,
{
    let mut registration = MultiResolutionRegistration::new(metric);
    if let Some(checker) = classical.convergence() {
        registration = registration.with_convergence(checker);
    }
    let optimizer = |lr| AdamOptimizer::<AffineTransform<B, 3>, B>::new(lr);
    Ok(registration.execute(fixed, moving, transform, optimizer, schedule)?)
}

/// Classical multi-resolution registration from the identity; returns the world matrix
/// mapping fixed points to moving points.
pub fn register_classical<B: AutodiffBackend>(
    classical: &ClassicalConfig,
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
) -> Result<Matrix4<f64>> {
    let device = fixed.data().device();
    let schedule = classical.schedule()?;
    let center = fixed.geometry().center().to_array().map(|v| v as f32);
    let transform = AffineTransform::<B, 3>::identity(Some(Tensor::from_floats(center, &device)), &device)
        .with_translation_scale(classical.translation_scale);

    let transform = match classical.metric {
        SimilarityMetric::Mse => register_with(MeanSquaredError::new(), classical, &schedule, fixed, moving, transform)?,
        SimilarityMetric::Ncc => {
            register_with(NormalizedCrossCorrelation::new(), classical, &schedule, fixed, moving, transform)?
        }
    };
    Ok(transform.to_homogeneous()?)
}

pub struct Benchmark<B: AutodiffBackend> {
    config: BenchmarkConfig,
    predictor: AffinePredictor<B::InnerBackend>,
    tracker: ProgressTracker,
}

impl<B: AutodiffBackend> Benchmark<B> {
    pub fn new(config: BenchmarkConfig, predictor: AffinePredictor<B::InnerBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            predictor,
            tracker: ProgressTracker::new(),
        })
    }

    /// Receives one update per finished case, with the learned TRE as loss.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.tracker.add_callback(callback);
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Evaluate `cases_per_pair` perturbations of every pair.
    ///
    /// Pairs must already be preprocessed to the predictor's resolution.
    pub fn run(&self, pairs: &[LoadedPair<B>]) -> Result<BenchmarkReport> {
        let sampler = RandomAffine::new(self.config.augmentation.clone())?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let total = pairs.len() * self.config.cases_per_pair;

        info!("Benchmarking {} pairs x {} cases", pairs.len(), self.config.cases_per_pair);
        self.tracker.start();
        let mut cases = Vec::with_capacity(total);
        for pair in pairs {
            for case in 0..self.config.cases_per_pair {
                let result = self.run_case(pair, case, sampler.sample(&mut rng))?;
                self.tracker
                    .update(cases.len() + 1, Some(total), result.learned.tre_mm, 0.0);
                cases.push(result);
            }
        }

        let report = BenchmarkReport::new(self.config.clone(), cases);
        self.tracker.complete(report.learned.tre_mm.mean, 0.0);
        Ok(report)
    }

    /// Perturb the moving volume of `pair` by `params` and register it with both methods.
    pub fn run_case(&self, pair: &LoadedPair<B>, case: usize, params: AffineParameters) -> Result<CaseResult> {
        let fixed_geometry = pair.fixed.geometry();
        let perturbation = Perturbation::for_pair(params, &fixed_geometry, &pair.moving.geometry())?;
        let moving = perturbation.apply(&pair.moving, self.config.padding)?;
        let truth = perturbation.target_world()?;

        let fixed_inner = inner_image(&pair.fixed)?;
        let moving_inner = inner_image(&moving)?;
        let initial = self.evaluate(0.0, &Matrix4::identity(), &truth, &fixed_inner, &moving_inner)?;

        let start = Instant::now();
        let prediction = self.predictor.predict_prepared(&fixed_inner, &moving_inner)?;
        let learned_seconds = start.elapsed().as_secs_f64();
        let learned = self.evaluate(learned_seconds, &prediction.world, &truth, &fixed_inner, &moving_inner)?;

        let start = Instant::now();
        let classical_world = register_classical(&self.config.classical, &pair.fixed, &moving)?;
        let classical_seconds = start.elapsed().as_secs_f64();
        let classical = self.evaluate(classical_seconds, &classical_world, &truth, &fixed_inner, &moving_inner)?;

        debug!(
            "{} case {}: TRE initial {:.2} mm, learned {:.2} mm ({:.3}s), classical {:.2} mm ({:.3}s)",
            pair.name, case, initial.tre_mm, learned.tre_mm, learned.seconds, classical.tre_mm, classical.seconds
        );
        Ok(CaseResult {
            pair: pair.name.clone(),
            case,
            perturbation: params,
            initial,
            learned,
            classical,
        })
    }

    fn evaluate(
        &self,
        seconds: f64,
        estimated: &Matrix4<f64>,
        truth: &Matrix4<f64>,
        fixed: &Image<B::InnerBackend, 3>,
        moving: &Image<B::InnerBackend, 3>,
    ) -> Result<MethodResult> {
        let errors = transform_errors(estimated, truth, &fixed.geometry(), &moving.geometry())?;
        let ncc = warped_ncc(estimated, fixed, moving, self.config.padding)?;
        Ok(MethodResult::new(seconds, errors, ncc))
    }
}

/// NCC between `fixed` and `moving` resampled onto it through `world`.
pub fn warped_ncc<B: Backend>(
    world: &Matrix4<f64>,
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    padding: PaddingMode,
) -> Result<f64> {
    let fixed_geometry = fixed.geometry();
    let theta = world_to_theta(world, &fixed_geometry, &moving.geometry())?;
    let warped = AffineSpatialTransformer::new(padding).warp_image(moving, &theta, &fixed_geometry)?;
    let ncc = global_ncc(image_to_tensor(fixed), image_to_tensor(&warped));
    Ok(ncc.into_scalar().elem::<f64>())
}
