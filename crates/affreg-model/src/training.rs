//! Supervised training of the affine network on synthetic perturbations.
//!
//! Every training step perturbs the moving volume of each pair with a fresh random
//! affine, asks the network for the grid theta that undoes it, and regresses the
//! prediction onto the known target. Validation uses a fixed, seeded set of
//! perturbations so that epochs are comparable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use affreg_io::{LoadedPair, Preprocessing};
use affreg_registration::optimizer::{LearningRateScheduler, StepDecay};
use affreg_registration::progress::{EarlyStoppingCallback, ProgressCallback, ProgressTracker};
use anyhow::{anyhow, bail, ensure, Context, Result};
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use nalgebra::Matrix3x4;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::affine::{theta_batch, AffineNetwork, AffineNetworkConfig, AffineSpatialTransformer};
use crate::augmentation::{Perturbation, RandomAffine, RandomAffineConfig};
use crate::interpolation::PaddingMode;
use crate::io::{images_to_batch, pair_input};
use crate::losses::{AffineParameterLoss, AffineParameterLossConfig, GlobalNCCLoss};

pub const CONFIG_FILE: &str = "config.json";
/// Checkpoint stem; the recorder appends `.mpk`.
pub const MODEL_FILE: &str = "model";
pub const SUMMARY_FILE: &str = "training_summary.json";

const VALIDATION_METRIC: &str = "val_loss";
const VALIDATION_SEED_OFFSET: u64 = 0x5EED;

#[derive(Config)]
pub struct TrainingConfig {
    pub network: AffineNetworkConfig,
    pub optimizer: AdamConfig,
    #[config(default = "RandomAffineConfig::new()")]
    pub augmentation: RandomAffineConfig,
    #[config(default = "Preprocessing::new()")]
    pub preprocessing: Preprocessing,
    #[config(default = "AffineParameterLossConfig::new()")]
    pub loss: AffineParameterLossConfig,
    #[config(default = 50)]
    pub num_epochs: usize,
    #[config(default = 2)]
    pub batch_size: usize,
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    /// Epochs between learning-rate reductions.
    #[config(default = 20)]
    pub lr_step_epochs: usize,
    #[config(default = 0.5)]
    pub lr_gamma: f64,
    /// Weight of the `1 - NCC` image term; 0 disables it.
    #[config(default = 0.0)]
    pub similarity_weight: f64,
    #[config(default = 0.2)]
    pub validation_fraction: f64,
    /// Fixed perturbations drawn per validation pair.
    #[config(default = 2)]
    pub validation_cases: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// Epochs without validation improvement before stopping; 0 disables.
    #[config(default = 10)]
    pub patience: usize,
    /// Smallest decrease of the monitored loss that counts as an improvement.
    #[config(default = 0.0)]
    pub min_improvement: f64,
    #[config(default = "PaddingMode::Zeros")]
    pub padding: PaddingMode,
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            bail!("num_epochs must be positive");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.similarity_weight < 0.0 {
            bail!("similarity_weight must be non-negative, got {}", self.similarity_weight);
        }
        if !(self.min_improvement >= 0.0) {
            bail!("min_improvement must be non-negative, got {}", self.min_improvement);
        }
        if self.network.channels.is_empty() {
            bail!("The network needs at least one convolution block");
        }
        StepDecay::new(self.lr_step_epochs, self.lr_gamma)?;
        self.augmentation.validate()
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        Self::load(&path).map_err(|e| anyhow!("Failed to load {}: {e:?}", path.display()))
    }
}

/// Outcome of [`Trainer::fit`], also written to `training_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub best_epoch: usize,
    /// Best validation loss, or best training loss without a validation set.
    pub best_loss: f64,
    pub train_losses: Vec<f64>,
    pub validation_losses: Vec<f64>,
    pub stopped_early: bool,
    pub seconds: f64,
}

/// Tensors of one training step.
#[derive(Debug, Clone)]
pub struct TrainingBatch<B: Backend> {
    /// `[N, 2, D, H, W]` perturbed moving ‖ fixed.
    pub input: Tensor<B, 5>,
    /// `[N, 1, D, H, W]`
    pub fixed: Tensor<B, 5>,
    /// `[N, 1, D, H, W]` perturbed moving volumes.
    pub moving: Tensor<B, 5>,
    /// `[N, 12]` target thetas.
    pub target: Tensor<B, 2>,
}

impl<B: AutodiffBackend> TrainingBatch<B> {
    /// Detach from the autodiff graph for evaluation.
    pub fn inner(self) -> TrainingBatch<B::InnerBackend> {
        TrainingBatch {
            input: self.input.inner(),
            fixed: self.fixed.inner(),
            moving: self.moving.inner(),
            target: self.target.inner(),
        }
    }
}

/// Perturb the moving volume of every pair with a freshly sampled affine.
pub fn make_batch<B: Backend, R: Rng + ?Sized>(
    pairs: &[&LoadedPair<B>],
    sampler: &RandomAffine,
    padding: PaddingMode,
    rng: &mut R,
) -> Result<TrainingBatch<B>> {
    ensure!(!pairs.is_empty(), "Cannot build an empty batch");
    let device = pairs[0].fixed.data().device();

    let mut warped = Vec::with_capacity(pairs.len());
    let mut targets: Vec<Matrix3x4<f64>> = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let perturbation = Perturbation::for_pair(
            sampler.sample(rng),
            &pair.fixed.geometry(),
            &pair.moving.geometry(),
        )?;
        warped.push(perturbation.apply(&pair.moving, padding)?);
        targets.push(perturbation.target);
    }

    let fixed = images_to_batch(&pairs.iter().map(|p| &p.fixed).collect::<Vec<_>>())?;
    let moving = images_to_batch(&warped.iter().collect::<Vec<_>>())?;
    Ok(TrainingBatch {
        input: pair_input(moving.clone(), fixed.clone())?,
        fixed,
        moving,
        target: theta_batch::<B>(&targets, &device),
    })
}

/// Trains an [`AffineNetwork`] and keeps the best checkpoint in `artifact_dir`.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    artifact_dir: PathBuf,
    device: B::Device,
    tracker: ProgressTracker,
    loss: AffineParameterLoss,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, artifact_dir: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        config.validate()?;
        let loss = config.loss.init();
        Ok(Self {
            config,
            artifact_dir: artifact_dir.into(),
            device,
            tracker: ProgressTracker::new(),
            loss,
        })
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.tracker.add_callback(callback);
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn batch_loss<BB: Backend>(&self, model: &AffineNetwork<BB>, batch: &TrainingBatch<BB>) -> Tensor<BB, 1> {
        let prediction = model.forward(batch.input.clone());
        let loss = self.loss.forward(prediction.clone(), batch.target.clone());
        if self.config.similarity_weight <= 0.0 {
            return loss;
        }
        let warped = AffineSpatialTransformer::new(self.config.padding).forward(batch.moving.clone(), prediction);
        loss + GlobalNCCLoss::new().forward(batch.fixed.clone(), warped) * self.config.similarity_weight
    }

    fn validation_batches(
        &self,
        pairs: &[LoadedPair<B>],
        sampler: &RandomAffine,
    ) -> Result<Vec<TrainingBatch<B::InnerBackend>>> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(VALIDATION_SEED_OFFSET));
        let cases = self.config.validation_cases.max(1);
        pairs
            .iter()
            .map(|pair| -> Result<TrainingBatch<B::InnerBackend>> {
                let repeated = vec![pair; cases];
                Ok(make_batch(&repeated, sampler, self.config.padding, &mut rng)?.inner())
            })
            .collect()
    }

    fn evaluate(&self, model: &AffineNetwork<B::InnerBackend>, batches: &[TrainingBatch<B::InnerBackend>]) -> f64 {
        let total: f64 = batches
            .iter()
            .map(|batch| self.batch_loss(model, batch).into_scalar().elem::<f64>())
            .sum();
        total / batches.len() as f64
    }

    /// Mean loss of `model` on the seeded validation perturbations of `valid`, the same
    /// ones [`Trainer::fit`] evaluates after every epoch.
    pub fn validation_loss(&self, model: &AffineNetwork<B::InnerBackend>, valid: &[LoadedPair<B>]) -> Result<f64> {
        ensure!(!valid.is_empty(), "No validation pairs");
        let sampler = RandomAffine::new(self.config.augmentation.clone())?;
        let batches = self.validation_batches(valid, &sampler)?;
        Ok(self.evaluate(model, &batches))
    }

    /// Train on `train`, validating on `valid` after every epoch.
    pub fn fit(&self, train: &[LoadedPair<B>], valid: &[LoadedPair<B>]) -> Result<TrainingSummary> {
        ensure!(!train.is_empty(), "No training pairs");
        let config = &self.config;
        let start = Instant::now();

        fs::create_dir_all(&self.artifact_dir)
            .with_context(|| format!("Failed to create {}", self.artifact_dir.display()))?;
        config
            .save(self.artifact_dir.join(CONFIG_FILE))
            .context("Failed to save training config")?;

        B::seed(config.seed);
        let mut model = config.network.init::<B>(&self.device);
        let mut optim = config.optimizer.init::<B, AffineNetwork<B>>();
        let sampler = RandomAffine::new(config.augmentation.clone())?;
        let schedule = StepDecay::new(config.lr_step_epochs, config.lr_gamma)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let validation = self.validation_batches(valid, &sampler)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        let mut tracker = self.tracker.clone();
        if config.patience > 0 {
            let stopper = EarlyStoppingCallback::new(config.min_improvement, config.patience);
            let stopper = if validation.is_empty() {
                stopper
            } else {
                stopper.monitoring(VALIDATION_METRIC)
            };
            tracker.add_callback(Arc::new(stopper));
        }

        info!(
            "Training on {} pairs ({} validation batches) for {} epochs",
            train.len(),
            validation.len(),
            config.num_epochs
        );
        tracker.start();

        let mut summary = TrainingSummary {
            epochs_run: 0,
            best_epoch: 0,
            best_loss: f64::INFINITY,
            train_losses: Vec::with_capacity(config.num_epochs),
            validation_losses: Vec::new(),
            stopped_early: false,
            seconds: 0.0,
        };
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut lr = config.learning_rate;

        for epoch in 1..=config.num_epochs {
            lr = schedule.get_lr(epoch - 1, config.learning_rate);
            order.shuffle(&mut rng);

            let mut total = 0.0;
            let mut batches = 0usize;
            for chunk in order.chunks(config.batch_size) {
                let pairs: Vec<&LoadedPair<B>> = chunk.iter().map(|&i| &train[i]).collect();
                let batch = make_batch(&pairs, &sampler, config.padding, &mut rng)?;

                let loss = self.batch_loss(&model, &batch);
                let value = loss.clone().into_scalar().elem::<f64>();
                if !value.is_finite() {
                    tracker.error(&format!("loss is {value} at epoch {epoch}"));
                    bail!("Training loss is {value} at epoch {epoch}");
                }

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);
                total += value;
                batches += 1;
            }
            let train_loss = total / batches as f64;
            summary.train_losses.push(train_loss);

            let mut metrics = Vec::new();
            let monitored = if validation.is_empty() {
                train_loss
            } else {
                let val_loss = self.evaluate(&model.valid(), &validation);
                summary.validation_losses.push(val_loss);
                metrics.push((VALIDATION_METRIC.to_string(), val_loss));
                val_loss
            };
            tracker.update_with_metrics(epoch, Some(config.num_epochs), train_loss, lr, metrics);
            summary.epochs_run = epoch;

            if monitored < summary.best_loss {
                summary.best_loss = monitored;
                summary.best_epoch = epoch;
                model
                    .clone()
                    .save_file(self.artifact_dir.join(MODEL_FILE), &recorder)
                    .map_err(|e| anyhow!("Failed to save checkpoint: {e:?}"))?;
                debug!("Saved checkpoint at epoch {epoch} (loss {monitored:.6})");
            }

            if tracker.should_stop() {
                summary.stopped_early = epoch < config.num_epochs;
                break;
            }
        }

        summary.seconds = start.elapsed().as_secs_f64();
        tracker.complete(summary.best_loss, lr);
        fs::write(
            self.artifact_dir.join(SUMMARY_FILE),
            serde_json::to_string_pretty(&summary)?,
        )
        .context("Failed to write training summary")?;

        info!(
            "Best loss {:.6} at epoch {} of {}",
            summary.best_loss, summary.best_epoch, summary.epochs_run
        );
        Ok(summary)
    }
}
