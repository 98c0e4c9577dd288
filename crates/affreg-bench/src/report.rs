use std::fs;
use std::path::Path;

use affreg_core::transform::AffineParameters;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BenchmarkConfig;
use crate::metrics::TransformErrors;

/// Result of one method on one case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    /// Wall-clock time of the estimate.
    pub seconds: f64,
    pub theta_error: f64,
    pub tre_mm: f64,
    pub rotation_error_deg: f64,
    pub translation_error_mm: f64,
    pub scale_error: f64,
    /// NCC between the fixed volume and the moving volume resampled by the estimate.
    pub ncc: f64,
}

impl MethodResult {
    pub fn new(seconds: f64, errors: TransformErrors, ncc: f64) -> Self {
        Self {
            seconds,
            theta_error: errors.theta_error,
            tre_mm: errors.tre_mm,
            rotation_error_deg: errors.rotation_error_deg,
            translation_error_mm: errors.translation_error_mm,
            scale_error: errors.scale_error,
            ncc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub pair: String,
    pub case: usize,
    pub perturbation: AffineParameters,
    /// Errors of the identity, i.e. before any registration.
    pub initial: MethodResult,
    pub learned: MethodResult,
    pub classical: MethodResult,
}

/// Statistics of one quantity over all cases. Non-finite values are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self {
                count: 0,
                mean: 0.0,
                median: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        values.sort_by(f64::total_cmp);

        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        } else {
            values[n / 2]
        };

        Self {
            count: n,
            mean,
            median,
            std: variance.sqrt(),
            min: values[0],
            max: values[n - 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub seconds: Summary,
    pub theta_error: Summary,
    pub tre_mm: Summary,
    pub rotation_error_deg: Summary,
    pub translation_error_mm: Summary,
    pub scale_error: Summary,
    pub ncc: Summary,
}

impl MethodSummary {
    pub fn from_results<'a>(results: impl Iterator<Item = &'a MethodResult> + Clone) -> Self {
        let field = |f: fn(&MethodResult) -> f64| Summary::from_values(results.clone().map(f));
        Self {
            seconds: field(|r| r.seconds),
            theta_error: field(|r| r.theta_error),
            tre_mm: field(|r| r.tre_mm),
            rotation_error_deg: field(|r| r.rotation_error_deg),
            translation_error_mm: field(|r| r.translation_error_mm),
            scale_error: field(|r| r.scale_error),
            ncc: field(|r| r.ncc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub config: BenchmarkConfig,
    pub cases: Vec<CaseResult>,
    pub initial: MethodSummary,
    pub learned: MethodSummary,
    pub classical: MethodSummary,
}

impl BenchmarkReport {
    pub fn new(config: BenchmarkConfig, cases: Vec<CaseResult>) -> Self {
        Self {
            initial: MethodSummary::from_results(cases.iter().map(|c| &c.initial)),
            learned: MethodSummary::from_results(cases.iter().map(|c| &c.learned)),
            classical: MethodSummary::from_results(cases.iter().map(|c| &c.classical)),
            config,
            cases,
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Wrote benchmark report to {}", path.display());
        Ok(())
    }

    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid report {}", path.display()))
    }

    /// Log the headline numbers of every method.
    pub fn log_summary(&self) {
        info!("Benchmark over {} cases", self.cases.len());
        for (name, summary) in [
            ("initial", &self.initial),
            ("learned", &self.learned),
            ("classical", &self.classical),
        ] {
            info!(
                "{name:>9}: TRE {:.2} ± {:.2} mm (median {:.2}), rotation {:.2}°, NCC {:.3}, {:.3}s per case",
                summary.tre_mm.mean,
                summary.tre_mm.std,
                summary.tre_mm.median,
                summary.rotation_error_deg.mean,
                summary.ncc.mean,
                summary.seconds.mean
            );
        }
    }
}
