//! Benchmark of the learned affine predictor against classical iterative registration.
//!
//! Every case perturbs a pair with a known random affine, estimates the transform with
//! both methods and scores the estimate against the truth.

pub mod config;
pub mod metrics;
pub mod report;
pub mod runner;

pub use config::{BenchmarkConfig, ClassicalConfig, SimilarityMetric};
pub use metrics::{transform_errors, TransformErrors};
pub use report::{BenchmarkReport, CaseResult, MethodResult, MethodSummary, Summary};
pub use runner::{register_classical, warped_ncc, Benchmark};
