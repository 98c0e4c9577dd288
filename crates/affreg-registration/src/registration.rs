use std::marker::PhantomData;
use std::sync::Arc;

use affreg_core::image::Image;
use affreg_core::transform::Transform;
use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::error::Result;
use crate::metric::Metric;
use crate::optimizer::{LearningRateScheduler, Optimizer};
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::validation::{
    validate_image, validate_iterations, validate_learning_rate, validate_loss, ConvergenceChecker,
};

const LOG_INTERVAL: usize = 50;

/// Gradient-descent registration of a single resolution level.
///
/// Each iteration evaluates the metric through the current transform, back-propagates
/// into the transform parameters and lets the optimizer update them.
pub struct Registration<B, O, M, T, const D: usize>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B, D>,
    T: Transform<B, D> + AutodiffModule<B>,
{
    optimizer: O,
    metric: M,
    scheduler: Option<Box<dyn LearningRateScheduler>>,
    convergence: Option<ConvergenceChecker>,
    tracker: ProgressTracker,
    loss_history: Vec<f64>,
    _phantom: PhantomData<(B, T)>,
}

impl<B, O, M, T, const D: usize> Registration<B, O, M, T, D>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B, D>,
    T: Transform<B, D> + AutodiffModule<B>,
{
    pub fn new(optimizer: O, metric: M) -> Self {
        Self {
            optimizer,
            metric,
            scheduler: None,
            convergence: None,
            tracker: ProgressTracker::new(),
            loss_history: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn with_scheduler(mut self, scheduler: impl LearningRateScheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Stop before `iterations` once the checker reports a plateau.
    pub fn with_convergence(mut self, checker: ConvergenceChecker) -> Self {
        self.convergence = Some(checker);
        self
    }

    pub fn with_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.tracker.add_callback(callback);
    }

    /// Loss at every iteration of the last run, evaluated before that iteration's update.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Optimise `transform` so that `moving ∘ transform` matches `fixed`.
    pub fn execute(
        &mut self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        mut transform: T,
        iterations: usize,
        learning_rate: f64,
    ) -> Result<T> {
        validate_image(fixed, "Fixed")?;
        validate_image(moving, "Moving")?;
        validate_iterations(iterations)?;
        validate_learning_rate(learning_rate)?;

        self.loss_history.clear();
        self.optimizer.set_learning_rate(learning_rate);
        self.tracker.start();

        for i in 0..iterations {
            let lr = self
                .scheduler
                .as_ref()
                .map(|s| s.get_lr(i, learning_rate))
                .unwrap_or(learning_rate);
            self.optimizer.set_learning_rate(lr);

            let loss = self.metric.forward(fixed, moving, &transform);
            let loss_value = loss.clone().into_scalar().elem::<f64>();
            if let Err(err) = validate_loss(loss_value, i) {
                self.tracker.error(&err.to_string());
                return Err(err);
            }
            self.loss_history.push(loss_value);
            self.tracker.update(i + 1, Some(iterations), loss_value, lr);

            if i % LOG_INTERVAL == 0 {
                tracing::debug!("Iteration {}: {} {:.6}", i, self.metric.name(), loss_value);
            }

            let grads = loss.backward();
            let grads_params = GradientsParams::from_grads(grads, &transform);
            transform = self.optimizer.step(transform, grads_params);

            let converged = self
                .convergence
                .as_ref()
                .is_some_and(|c| c.check_convergence(&self.loss_history));
            if converged || self.tracker.should_stop() {
                tracing::debug!("Stopping after {} of {} iterations", i + 1, iterations);
                break;
            }
        }

        let final_loss = self.loss_history.last().copied().unwrap_or(f64::NAN);
        self.tracker.complete(final_loss, self.optimizer.learning_rate());
        Ok(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistrationError;
    use crate::metric::MeanSquaredError;
    use crate::optimizer::{AdamOptimizer, StepDecay};
    use crate::progress::HistoryCallback;
    use affreg_core::spatial::{Direction, Point, Spacing};
    use affreg_core::transform::AffineTransform;
    use burn::backend::Autodiff;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type B = Autodiff<NdArray<f32>>;

    fn blob(shift: f32) -> Image<B, 3> {
        let device = Default::default();
        let d = 8;
        let mut values = Vec::with_capacity(d * d * d);
        for z in 0..d {
            for y in 0..d {
                for x in 0..d {
                    let dx = x as f32 - 3.5 - shift;
                    let dy = y as f32 - 3.5;
                    let dz = z as f32 - 3.5;
                    values.push((-(dx * dx + dy * dy + dz * dz) / 8.0).exp());
                }
            }
        }
        let data = Tensor::<B, 1>::from_floats(values.as_slice(), &device).reshape([d, d, d]);
        Image::new(data, Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap()
    }

    #[test]
    fn test_records_history_and_reduces_loss() {
        let device = Default::default();
        let fixed = blob(0.0);
        let moving = blob(0.5);
        let transform = AffineTransform::<B, 3>::identity(None, &device);

        let history = Arc::new(HistoryCallback::new());
        let mut registration = Registration::new(AdamOptimizer::new(0.05), MeanSquaredError::new())
            .with_scheduler(StepDecay::new(20, 0.5).unwrap());
        registration.add_callback(history.clone());

        registration.execute(&fixed, &moving, transform, 40, 0.05).unwrap();

        let losses = registration.loss_history();
        assert_eq!(losses.len(), 40);
        assert_eq!(history.get_history().len(), 40);
        assert!(losses[39] < losses[0], "{} !< {}", losses[39], losses[0]);
        // the step decay halves the learning rate after 20 iterations
        assert!((history.get_history()[25].learning_rate - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_convergence_stops_early() {
        let device = Default::default();
        let image = blob(0.0);
        let transform = AffineTransform::<B, 3>::identity(None, &device);

        let mut registration = Registration::new(AdamOptimizer::new(0.01), MeanSquaredError::new())
            .with_convergence(ConvergenceChecker::new(1e-3, 5).with_min_loss(1e-6));
        registration.execute(&image, &image, transform, 100, 0.01).unwrap();
        assert_eq!(registration.loss_history().len(), 1);
    }

    #[test]
    fn test_rejects_invalid_arguments() {
        let device = Default::default();
        let image = blob(0.0);
        let mut registration = Registration::new(AdamOptimizer::new(0.01), MeanSquaredError::new());

        let err = registration
            .execute(&image, &image, AffineTransform::<B, 3>::identity(None, &device), 0, 0.01)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConfiguration(_)));

        let err = registration
            .execute(&image, &image, AffineTransform::<B, 3>::identity(None, &device), 10, -1.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConfiguration(_)));
    }
}
