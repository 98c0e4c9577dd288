//! Iterative affine registration, used as the classical baseline for the learned model.
//!
//! A [`Registration`](registration::Registration) optimises the parameters of a
//! differentiable transform by back-propagating an image similarity
//! [`Metric`](metric::Metric); [`MultiResolutionRegistration`](multires::MultiResolutionRegistration)
//! runs it coarse-to-fine over Gaussian pyramids.

pub mod error;
pub mod metric;
pub mod multires;
pub mod optimizer;
pub mod progress;
pub mod registration;
pub mod validation;

pub use error::{RegistrationError, Result};
pub use metric::{MeanSquaredError, Metric, NormalizedCrossCorrelation};
pub use multires::{MultiResolutionRegistration, RegistrationSchedule};
pub use optimizer::{AdamOptimizer, LearningRateScheduler, Optimizer, StepDecay};
pub use progress::{
    ConsoleProgressCallback, EarlyStoppingCallback, HistoryCallback, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
pub use registration::Registration;
pub use validation::ConvergenceChecker;
