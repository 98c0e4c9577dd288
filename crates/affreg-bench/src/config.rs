use affreg_model::{PaddingMode, RandomAffineConfig};
use affreg_registration::{ConvergenceChecker, RegistrationSchedule};
use anyhow::{bail, Result};
use burn::config::Config;
use serde::{Deserialize, Serialize};

/// Similarity optimised by the classical baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Mse,
    #[default]
    Ncc,
}

impl std::str::FromStr for SimilarityMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mse" => Ok(Self::Mse),
            "ncc" => Ok(Self::Ncc),
            other => bail!("Unknown metric '{other}', expected 'mse' or 'ncc'"),
        }
    }
}

/// Settings of the classical multi-resolution baseline.
#[derive(Config, Debug)]
pub struct ClassicalConfig {
    #[config(default = 3)]
    pub levels: usize,
    /// Iterations per level.
    #[config(default = 100)]
    pub iterations: usize,
    #[config(default = 1e-2)]
    pub learning_rate: f64,
    /// Millimetres per unit of the optimised translation parameter.
    #[config(default = 10.0)]
    pub translation_scale: f64,
    #[config(default = "SimilarityMetric::Ncc")]
    pub metric: SimilarityMetric,
    #[config(default = 1e-5)]
    pub min_improvement: f64,
    /// Plateau length in iterations; 0 runs every level to completion.
    #[config(default = 20)]
    pub patience: usize,
}

impl ClassicalConfig {
    pub fn schedule(&self) -> Result<RegistrationSchedule<3>> {
        let schedule = RegistrationSchedule::new(self.levels)
            .with_iterations(vec![self.iterations; self.levels])?
            .with_learning_rates(vec![self.learning_rate; self.levels])?;
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn convergence(&self) -> Option<ConvergenceChecker> {
        (self.patience > 0).then(|| ConvergenceChecker::new(self.min_improvement, self.patience))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.translation_scale > 0.0 && self.translation_scale.is_finite()) {
            bail!("translation_scale must be positive, got {}", self.translation_scale);
        }
        self.schedule().map(|_| ())
    }
}

#[derive(Config, Debug)]
pub struct BenchmarkConfig {
    /// Random perturbations evaluated per pair.
    #[config(default = 5)]
    pub cases_per_pair: usize,
    #[config(default = 1234)]
    pub seed: u64,
    #[config(default = "RandomAffineConfig::new()")]
    pub augmentation: RandomAffineConfig,
    #[config(default = "ClassicalConfig::new()")]
    pub classical: ClassicalConfig,
    #[config(default = "PaddingMode::Zeros")]
    pub padding: PaddingMode,
}

impl BenchmarkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cases_per_pair == 0 {
            bail!("cases_per_pair must be positive");
        }
        self.augmentation.validate()?;
        self.classical.validate()
    }
}
