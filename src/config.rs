//! Top-level pipeline configuration

use crate::data::{DataConfig, SplitConfig};
use crate::error::{Result, ValuationError};
use crate::evaluation::EvaluationConfig;
use crate::features::FeatureConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attribution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub enabled: bool,
    /// Test rows explained per model (SHAP cost grows with rows times leaves)
    pub max_rows: usize,
    /// Features listed when a global ranking is summarized
    pub top_k: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rows: 1000,
            top_k: 10,
        }
    }
}

/// Every stage's settings plus the artifact directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub split: SplitConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub explain: ExplainConfig,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            features: FeatureConfig::default(),
            split: SplitConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
            explain: ExplainConfig::default(),
            output_dir: PathBuf::from("artifacts"),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Seed both the split and the searches
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split.seed = seed;
        self.training.seed = seed;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_explain(mut self, explain: ExplainConfig) -> Self {
        self.explain = explain;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.split.test_ratio > 0.0 && self.split.test_ratio < 1.0) {
            return Err(ValuationError::invalid_param(
                "split.test_ratio",
                self.split.test_ratio,
                "must be in (0, 1)",
            ));
        }
        if self.data.target_column.is_empty() {
            return Err(ValuationError::ConfigError("data.target_column is empty".to_string()));
        }
        if self.explain.enabled && self.explain.max_rows == 0 {
            return Err(ValuationError::invalid_param(
                "explain.max_rows",
                self.explain.max_rows,
                "must be positive when explanations are enabled",
            ));
        }
        if self
            .evaluation
            .dollar_thresholds
            .iter()
            .chain(self.evaluation.pct_thresholds.iter())
            .any(|t| !t.is_finite() || *t < 0.0)
        {
            return Err(ValuationError::ConfigError(
                "evaluation thresholds must be finite and non-negative".to_string(),
            ));
        }
        self.training.validate()
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a configuration; absent keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
