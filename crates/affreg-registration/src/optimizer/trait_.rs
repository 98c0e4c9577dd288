//! Optimizer and learning-rate scheduler traits.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{RegistrationError, Result};

/// Updates the parameters of a module from its gradients.
pub trait Optimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// One update step; returns the module with new parameter values.
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// Learning rate as a function of the step index.
pub trait LearningRateScheduler: Send + Sync {
    fn get_lr(&self, step: usize, initial_lr: f64) -> f64;
}

/// Keeps the initial learning rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantLr;

impl LearningRateScheduler for ConstantLr {
    fn get_lr(&self, _step: usize, initial_lr: f64) -> f64 {
        initial_lr
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecay {
    step_size: usize,
    gamma: f64,
}

impl StepDecay {
    pub fn new(step_size: usize, gamma: f64) -> Result<Self> {
        if !(gamma > 0.0 && gamma <= 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "Step decay gamma must be in (0, 1], got {gamma}"
            )));
        }
        if step_size == 0 {
            return Err(RegistrationError::invalid_configuration(
                "Step decay step size must be positive",
            ));
        }
        Ok(Self { step_size, gamma })
    }

    pub fn step_size(&self) -> usize {
        self.step_size
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl LearningRateScheduler for StepDecay {
    fn get_lr(&self, step: usize, initial_lr: f64) -> f64 {
        let exponent = step / self.step_size;
        initial_lr * self.gamma.powi(exponent as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decay() {
        let schedule = StepDecay::new(10, 0.5).unwrap();
        assert_eq!(schedule.get_lr(0, 0.1), 0.1);
        assert_eq!(schedule.get_lr(9, 0.1), 0.1);
        assert_eq!(schedule.get_lr(10, 0.1), 0.05);
        assert_eq!(schedule.get_lr(25, 0.1), 0.025);
    }

    #[test]
    fn test_step_decay_rejects_bad_parameters() {
        assert!(StepDecay::new(0, 0.5).is_err());
        assert!(StepDecay::new(10, 0.0).is_err());
        assert!(StepDecay::new(10, 1.5).is_err());
        assert!(StepDecay::new(10, 1.0).is_ok());
    }

    #[test]
    fn test_constant() {
        assert_eq!(ConstantLr.get_lr(1000, 0.3), 0.3);
    }
}
