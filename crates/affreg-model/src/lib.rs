//! Learned affine registration.
//!
//! An [`AffineNetwork`] regresses the grid theta that aligns a moving volume to a fixed
//! one. It is trained on synthetic perturbations with known ground truth
//! ([`augmentation`]) and applied through a differentiable spatial transformer.

pub mod affine;
pub mod augmentation;
pub mod inference;
pub mod interpolation;
pub mod io;
pub mod losses;
pub mod training;

pub use affine::{AffineNetwork, AffineNetworkConfig, AffineSpatialTransformer};
pub use augmentation::{Perturbation, RandomAffine, RandomAffineConfig};
pub use inference::{AffinePredictor, Prediction};
pub use interpolation::PaddingMode;
pub use losses::{AffineParameterLoss, AffineParameterLossConfig, GlobalNCCLoss};
pub use training::{make_batch, Trainer, TrainingBatch, TrainingConfig, TrainingSummary};
