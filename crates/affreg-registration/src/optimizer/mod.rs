//! Parameter optimisers for the iterative baseline.

pub mod trait_;
pub mod adam;

pub use trait_::{ConstantLr, LearningRateScheduler, Optimizer, StepDecay};
pub use adam::AdamOptimizer;
