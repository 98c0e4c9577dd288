//! Input checks and convergence detection for registration runs.

use affreg_core::image::Image;
use burn::tensor::backend::Backend;

use crate::error::{RegistrationError, Result};

/// An image must have at least two voxels along every axis to be registered.
pub fn validate_image<B: Backend, const D: usize>(image: &Image<B, D>, role: &str) -> Result<()> {
    let shape = image.shape();
    if shape.iter().any(|&s| s < 2) {
        return Err(RegistrationError::invalid_configuration(format!(
            "{role} image has shape {shape:?}; every axis needs at least 2 voxels"
        )));
    }
    Ok(())
}

/// Fail on NaN or infinite loss values.
pub fn validate_loss(loss: f64, iteration: usize) -> Result<()> {
    if !loss.is_finite() {
        return Err(RegistrationError::numerical_instability(format!(
            "Loss is {loss} at iteration {iteration}"
        )));
    }
    Ok(())
}

pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate must be positive, got {}",
            lr
        )));
    }

    if lr > 10.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate too large: {}",
            lr
        )));
    }

    if lr < 1e-10 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate too small: {}",
            lr
        )));
    }

    Ok(())
}

pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration("Iterations must be positive"));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Iterations too large: {}",
            iterations
        )));
    }

    Ok(())
}

/// Detects a plateau in the loss history.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker {
    /// Relative improvement over the window below which the run counts as converged.
    pub min_improvement: f64,
    /// Window length in iterations.
    pub patience: usize,
    /// Absolute loss at which the run counts as converged.
    pub min_loss: Option<f64>,
}

impl Default for ConvergenceChecker {
    fn default() -> Self {
        Self {
            min_improvement: 1e-6,
            patience: 50,
            min_loss: None,
        }
    }
}

impl ConvergenceChecker {
    pub fn new(min_improvement: f64, patience: usize) -> Self {
        Self {
            min_improvement,
            patience,
            min_loss: None,
        }
    }

    pub fn with_min_loss(mut self, min_loss: f64) -> Self {
        self.min_loss = Some(min_loss);
        self
    }

    /// True when the last loss is below `min_loss`, or when the loss `patience`
    /// iterations ago has not been improved on by more than `min_improvement` (relative).
    pub fn check_convergence(&self, loss_history: &[f64]) -> bool {
        let Some(&current) = loss_history.last() else {
            return false;
        };

        if let Some(min_loss) = self.min_loss {
            if current < min_loss {
                return true;
            }
        }

        if self.patience == 0 || loss_history.len() < self.patience + 1 {
            return false;
        }

        let reference = loss_history[loss_history.len() - self.patience - 1];
        let best_recent = loss_history[loss_history.len() - self.patience..]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);

        let relative_improvement = (reference - best_recent) / (reference.abs() + 1e-10);
        relative_improvement < self.min_improvement
    }
}
