use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use affreg_bench::{register_classical, Benchmark, BenchmarkConfig, ClassicalConfig};
use affreg_core::filter::ResampleImageFilter;
use affreg_core::interpolation::LinearInterpolator;
use affreg_core::spatial::Point;
use affreg_core::transform::{AffineParameters, AffineTransform};
use affreg_io::{discover_pairs, load_pairs, read_nifti, split_pairs, write_nifti, Preprocessing, VolumePair};
use affreg_model::{AffineNetworkConfig, AffinePredictor, Trainer, TrainingConfig};
use anyhow::{anyhow, bail, Context, Result};
use burn::backend::Autodiff;
use burn::config::Config;
use burn::optim::AdamConfig;
use nalgebra::Matrix4;
use serde::Serialize;
use tracing::info;

use crate::progress::BarCallback;
use crate::{RegisterArgs, TrainArgs};

#[cfg(not(feature = "wgpu"))]
type Inference = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
type Inference = burn::backend::Wgpu;

type Training = Autodiff<Inference>;

/// Transform written by `predict` and `register`.
#[derive(Serialize)]
struct TransformOutput {
    /// Fixed points (mm) to moving points (mm).
    world: Matrix4<f64>,
    /// Decomposition about the fixed volume centre.
    parameters: AffineParameters,
    seconds: f64,
}

fn write_transform(path: &Path, world: Matrix4<f64>, center: &Point<3>, seconds: f64) -> Result<()> {
    let output = TransformOutput {
        world,
        parameters: AffineParameters::from_matrix(&world, center)?,
        seconds,
    };
    fs::write(path, serde_json::to_string_pretty(&output)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote transform to {}", path.display());
    Ok(())
}

fn log_parameters(world: &Matrix4<f64>, center: &Point<3>) -> Result<()> {
    let p = AffineParameters::from_matrix(world, center)?;
    info!(
        "scales {:.3?}, rotation {:.2?} deg, translation {:.2?} mm",
        p.scales, p.degrees, p.translation
    );
    Ok(())
}

pub fn list_pairs(data_dir: &Path) -> Result<()> {
    for pair in discover_pairs(data_dir)? {
        if pair.is_self_pair() {
            println!("{}\t{}\t(self)", pair.name, pair.fixed.display());
        } else {
            println!("{}\t{}\t{}", pair.name, pair.fixed.display(), pair.moving.display());
        }
    }
    Ok(())
}

pub fn train(args: TrainArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path).map_err(|e| anyhow!("Failed to load {}: {e:?}", path.display()))?,
        None => TrainingConfig::new(AffineNetworkConfig::new(), AdamConfig::new()),
    };
    if let Some(epochs) = args.epochs {
        config.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(shape) = args.shape {
        config.preprocessing.target_shape = [shape; 3];
    }
    if let Some(weight) = args.similarity_weight {
        config.similarity_weight = weight;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    let pairs = discover_pairs(&args.data_dir)?;
    let (train_pairs, valid_pairs) = split_pairs(&pairs, config.validation_fraction, config.seed)?;
    info!("{} training and {} validation pairs", train_pairs.len(), valid_pairs.len());

    let device = Default::default();
    let train_set = load_pairs::<Training>(&train_pairs, &config.preprocessing, &device)?;
    let valid_set = load_pairs::<Training>(&valid_pairs, &config.preprocessing, &device)?;

    let epochs = config.num_epochs;
    let mut trainer = Trainer::<Training>::new(config, &args.output, device)?;
    trainer.add_callback(Arc::new(BarCallback::new(epochs, "loss")?));
    let summary = trainer.fit(&train_set, &valid_set)?;

    info!(
        "Finished after {} epochs in {:.1}s; best loss {:.6} at epoch {}. Artifacts in {}",
        summary.epochs_run,
        summary.seconds,
        summary.best_loss,
        summary.best_epoch,
        args.output.display()
    );
    Ok(())
}

pub fn predict(model: &Path, fixed: &Path, moving: &Path, output: Option<&Path>, matrix: Option<&Path>) -> Result<()> {
    let device = Default::default();
    let predictor = AffinePredictor::<Inference>::load(model, &device)?;
    let fixed = read_nifti::<Inference, _>(fixed, &device)?;
    let moving = read_nifti::<Inference, _>(moving, &device)?;

    let start = Instant::now();
    let prediction = predictor.predict(&fixed, &moving)?;
    let seconds = start.elapsed().as_secs_f64();
    let center = fixed.geometry().center();
    info!("Predicted in {seconds:.3}s");
    log_parameters(&prediction.world, &center)?;

    if let Some(path) = matrix {
        write_transform(path, prediction.world, &center, seconds)?;
    }
    if let Some(path) = output {
        let warped = predictor.warp(&moving, &fixed.geometry(), &prediction)?;
        write_nifti(path, &warped)?;
        info!("Wrote warped volume to {}", path.display());
    }
    Ok(())
}

pub fn register(args: RegisterArgs) -> Result<()> {
    let device = Default::default();
    let fixed = read_nifti::<Training, _>(&args.fixed, &device)?;
    let moving = read_nifti::<Training, _>(&args.moving, &device)?;

    let preprocessing = Preprocessing::new().with_target_shape([args.shape; 3]);
    let fixed_small = preprocessing.apply(&fixed)?;
    let moving_small = preprocessing.apply(&moving)?;

    let classical = ClassicalConfig::new()
        .with_levels(args.levels)
        .with_iterations(args.iterations)
        .with_learning_rate(args.learning_rate)
        .with_metric(args.metric);
    classical.validate()?;

    let start = Instant::now();
    let world = register_classical(&classical, &fixed_small, &moving_small)?;
    let seconds = start.elapsed().as_secs_f64();
    let center = fixed.geometry().center();
    info!("Registered in {seconds:.2}s");
    log_parameters(&world, &center)?;

    if let Some(path) = &args.matrix {
        write_transform(path, world, &center, seconds)?;
    }
    if let Some(path) = &args.output {
        let transform = AffineTransform::<Training, 3>::from_homogeneous(&world, &center, &device);
        let warped =
            ResampleImageFilter::new_from_reference(&fixed, transform, LinearInterpolator::new()).apply(&moving)?;
        write_nifti(path, &warped)?;
        info!("Wrote warped volume to {}", path.display());
    }
    Ok(())
}

/// The validation side of the split the model was trained with.
fn validation_pairs(model: &Path, pairs: &[VolumePair]) -> Result<Vec<VolumePair>> {
    let training = TrainingConfig::load_from_dir(model)?;
    let (_, valid) = split_pairs(pairs, training.validation_fraction, training.seed)?;
    if valid.is_empty() {
        bail!("The training split of {} has no validation pairs", model.display());
    }
    info!("Benchmarking the {} validation pairs of the training split", valid.len());
    Ok(valid)
}

pub fn benchmark(
    model: &Path,
    data_dir: &Path,
    output: &Path,
    config: Option<&Path>,
    cases: Option<usize>,
    seed: Option<u64>,
    validation_only: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => BenchmarkConfig::load(path).map_err(|e| anyhow!("Failed to load {}: {e:?}", path.display()))?,
        None => BenchmarkConfig::new(),
    };
    if let Some(cases) = cases {
        config.cases_per_pair = cases;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let device = Default::default();
    let predictor = AffinePredictor::<Inference>::load(model, &device)?;
    let pairs = discover_pairs(data_dir)?;
    let pairs = if validation_only {
        validation_pairs(model, &pairs)?
    } else {
        pairs
    };
    let loaded = load_pairs::<Training>(&pairs, predictor.preprocessing(), &device)?;

    let total = loaded.len() * config.cases_per_pair;
    let mut benchmark = Benchmark::<Training>::new(config, predictor)?;
    benchmark.add_callback(Arc::new(BarCallback::new(total, "learned TRE")?));

    let report = benchmark.run(&loaded)?;
    report.log_summary();
    report.write_json(output)
}
