use std::marker::PhantomData;

use affreg_core::filter::MultiResolutionPyramid;
use affreg_core::image::Image;
use affreg_core::transform::Transform;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{RegistrationError, Result};
use crate::metric::Metric;
use crate::optimizer::Optimizer;
use crate::progress::ProgressTracker;
use crate::registration::Registration;
use crate::validation::ConvergenceChecker;

/// Per-level settings for coarse-to-fine registration, coarsest level first.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSchedule<const D: usize> {
    pub shrink_factors: Vec<Vec<usize>>,
    pub smoothing_sigmas: Vec<Vec<f64>>,
    pub iterations: Vec<usize>,
    pub learning_rates: Vec<f64>,
}

impl<const D: usize> RegistrationSchedule<D> {
    /// Power-of-two shrinking with sigma = factor / 2, 100 iterations and lr 1e-2 per level.
    pub fn new(levels: usize) -> Self {
        let (shrink_factors, smoothing_sigmas) = (0..levels)
            .map(|i| {
                let factor = 2usize.pow((levels - 1 - i) as u32);
                let sigma = if factor > 1 { 0.5 * factor as f64 } else { 0.0 };
                (vec![factor; D], vec![sigma; D])
            })
            .unzip();

        Self {
            shrink_factors,
            smoothing_sigmas,
            iterations: vec![100; levels],
            learning_rates: vec![1e-2; levels],
        }
    }

    pub fn levels(&self) -> usize {
        self.shrink_factors.len()
    }

    pub fn with_iterations(mut self, iterations: Vec<usize>) -> Result<Self> {
        self.check_len("iterations", iterations.len())?;
        self.iterations = iterations;
        Ok(self)
    }

    pub fn with_learning_rates(mut self, learning_rates: Vec<f64>) -> Result<Self> {
        self.check_len("learning_rates", learning_rates.len())?;
        self.learning_rates = learning_rates;
        Ok(self)
    }

    fn check_len(&self, name: &str, len: usize) -> Result<()> {
        if len != self.levels() {
            return Err(RegistrationError::invalid_configuration(format!(
                "{name} has {len} entries for {} levels",
                self.levels()
            )));
        }
        Ok(())
    }

    /// All per-level vectors must have one entry per level.
    pub fn validate(&self) -> Result<()> {
        if self.levels() == 0 {
            return Err(RegistrationError::invalid_configuration("Schedule has no levels"));
        }
        self.check_len("smoothing_sigmas", self.smoothing_sigmas.len())?;
        self.check_len("iterations", self.iterations.len())?;
        self.check_len("learning_rates", self.learning_rates.len())
    }
}

/// Coarse-to-fine registration over Gaussian pyramids of both images.
///
/// The transform acts on world coordinates, so it carries over between levels unchanged;
/// every level starts with a fresh optimizer.
pub struct MultiResolutionRegistration<B, M, T, const D: usize> {
    metric: M,
    convergence: Option<ConvergenceChecker>,
    tracker: ProgressTracker,
    level_losses: Vec<Vec<f64>>,
    _phantom: PhantomData<(B, T)>,
}

impl<B, M, T, const D: usize> MultiResolutionRegistration<B, M, T, D>
where
    B: AutodiffBackend,
    M: Metric<B, D> + Clone,
    T: Transform<B, D> + AutodiffModule<B>,
{
    pub fn new(metric: M) -> Self {
        Self {
            metric,
            convergence: None,
            tracker: ProgressTracker::new(),
            level_losses: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn with_convergence(mut self, checker: ConvergenceChecker) -> Self {
        self.convergence = Some(checker);
        self
    }

    /// Tracker shared by all levels; it restarts at each level.
    pub fn with_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Loss history of every level of the last run.
    pub fn level_losses(&self) -> &[Vec<f64>] {
        &self.level_losses
    }

    /// Register `moving` onto `fixed`, creating one optimizer per level with
    /// `optimizer_factory(learning_rate)`.
    pub fn execute<F, O>(
        &mut self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        mut transform: T,
        optimizer_factory: F,
        schedule: &RegistrationSchedule<D>,
    ) -> Result<T>
    where
        F: Fn(f64) -> O,
        O: Optimizer<T, B>,
    {
        schedule.validate()?;
        let fixed_pyramid = MultiResolutionPyramid::new(fixed, &schedule.shrink_factors, &schedule.smoothing_sigmas)?;
        let moving_pyramid = MultiResolutionPyramid::new(moving, &schedule.shrink_factors, &schedule.smoothing_sigmas)?;

        self.level_losses.clear();
        let levels = schedule.levels();
        for level in 0..levels {
            let (Some(fixed_level), Some(moving_level)) =
                (fixed_pyramid.get_level(level), moving_pyramid.get_level(level))
            else {
                return Err(RegistrationError::invalid_configuration(format!(
                    "Pyramid has no level {level}"
                )));
            };

            let lr = schedule.learning_rates[level];
            let iterations = schedule.iterations[level];
            tracing::info!(
                "Level {}/{}: fixed {:?}, moving {:?}, lr={}, iters={}",
                level + 1,
                levels,
                fixed_level.shape(),
                moving_level.shape(),
                lr,
                iterations
            );

            let mut registration = Registration::new(optimizer_factory(lr), self.metric.clone())
                .with_tracker(self.tracker.clone());
            if let Some(checker) = &self.convergence {
                registration = registration.with_convergence(checker.clone());
            }

            transform = registration.execute(fixed_level, moving_level, transform, iterations, lr)?;
            self.level_losses.push(registration.loss_history().to_vec());
        }

        Ok(transform)
    }
}
