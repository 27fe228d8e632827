//! Held-out evaluation of trained models

mod metrics;

pub use metrics::{evaluate, regression_report, EvaluationConfig, EvaluationReport, ThresholdHit};
