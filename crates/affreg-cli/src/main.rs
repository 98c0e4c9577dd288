use std::path::PathBuf;

use affreg_bench::SimilarityMetric;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

#[derive(Parser)]
#[command(name = "affreg", version)]
#[command(about = "Learned and classical affine registration of 3-D volumes")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the fixed/moving pairs found in a data directory
    Pairs {
        data_dir: PathBuf,
    },

    /// Train the affine network on the pairs of a data directory
    Train(TrainArgs),

    /// Predict the affine between two volumes with a trained network
    Predict {
        /// Directory holding config.json and the model checkpoint
        #[arg(short, long)]
        model: PathBuf,

        fixed: PathBuf,

        moving: PathBuf,

        /// Write the moving volume resampled onto the fixed grid
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the predicted transform as JSON
        #[arg(long)]
        matrix: Option<PathBuf>,
    },

    /// Register two volumes with classical multi-resolution optimisation
    Register(RegisterArgs),

    /// Compare the trained network with classical registration on synthetic perturbations
    ///
    /// Every discovered pair is evaluated unless --validation-only is given.
    Benchmark {
        /// Directory holding config.json and the model checkpoint
        #[arg(short, long)]
        model: PathBuf,

        data_dir: PathBuf,

        /// Report path
        #[arg(short, long, default_value = "benchmark.json")]
        output: PathBuf,

        /// Benchmark config JSON; defaults are used otherwise
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        cases: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Only evaluate the validation pairs of the model's training split
        #[arg(long)]
        validation_only: bool,
    },
}

#[derive(Args)]
struct TrainArgs {
    data_dir: PathBuf,

    /// Directory for config.json, the checkpoint and the training summary
    #[arg(short, long, default_value = "artifacts")]
    output: PathBuf,

    /// Training config JSON; defaults are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Edge length of the cubic network input
    #[arg(long)]
    shape: Option<usize>,

    #[arg(long)]
    similarity_weight: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct RegisterArgs {
    fixed: PathBuf,

    moving: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    matrix: Option<PathBuf>,

    /// Edge length of the cubic grid both volumes are resampled to before optimising
    #[arg(long, default_value_t = 64)]
    shape: usize,

    #[arg(long, default_value_t = 3)]
    levels: usize,

    /// Iterations per level
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    #[arg(long, default_value_t = 1e-2)]
    learning_rate: f64,

    /// mse or ncc
    #[arg(long, default_value = "ncc")]
    metric: SimilarityMetric,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Pairs { data_dir } => commands::list_pairs(&data_dir),
        Commands::Train(args) => commands::train(args),
        Commands::Predict {
            model,
            fixed,
            moving,
            output,
            matrix,
        } => commands::predict(&model, &fixed, &moving, output.as_deref(), matrix.as_deref()),
        Commands::Register(args) => commands::register(args),
        Commands::Benchmark {
            model,
            data_dir,
            output,
            config,
            cases,
            seed,
            validation_only,
        } => commands::benchmark(
            &model,
            &data_dir,
            &output,
            config.as_deref(),
            cases,
            seed,
            validation_only,
        ),
    }
}
