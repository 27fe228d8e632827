//! Training configuration: model families, scoring and search spaces

use super::random_forest::MaxFeatures;
use crate::error::{Result, ValuationError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model family trained by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Ridge,
    RandomForest,
    LightGbm,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [ModelFamily::Ridge, ModelFamily::RandomForest, ModelFamily::LightGbm];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Ridge => "ridge",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::LightGbm => "lightgbm",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ridge" => Ok(ModelFamily::Ridge),
            "random_forest" | "rf" => Ok(ModelFamily::RandomForest),
            "lightgbm" | "lgbm" | "gbdt" => Ok(ModelFamily::LightGbm),
            other => Err(ValuationError::ConfigError(format!("unknown model family '{}'", other))),
        }
    }
}

/// Cross-validation scoring rule. Higher is always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    R2,
    NegRmse,
    NegMae,
}

impl Scoring {
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let n = y_true.len().max(1) as f64;
        match self {
            Scoring::R2 => {
                let mean = y_true.mean().unwrap_or(0.0);
                let ss_res: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
                let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
                if ss_tot > 0.0 {
                    1.0 - ss_res / ss_tot
                } else if ss_res == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Scoring::NegRmse => {
                let mse: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n;
                -mse.sqrt()
            }
            Scoring::NegMae => -y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).abs()).sum::<f64>() / n,
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scoring::R2 => "r2",
            Scoring::NegRmse => "neg_rmse",
            Scoring::NegMae => "neg_mae",
        })
    }
}

/// Ridge grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeSpace {
    pub alphas: Vec<f64>,
}

impl Default for RidgeSpace {
    fn default() -> Self {
        Self {
            alphas: vec![0.01, 0.1, 1.0, 10.0, 100.0],
        }
    }
}

/// Random forest distributions (uniform over each list)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestSpace {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for ForestSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200, 300],
            max_depth: vec![None, Some(10), Some(20), Some(30)],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Fraction(0.5), MaxFeatures::All],
        }
    }
}

/// Gradient boosting distributions (uniform over each list)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingSpace {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub max_leaves: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_child_samples: Vec<usize>,
    pub subsample: Vec<f64>,
    pub colsample_bytree: Vec<f64>,
    pub reg_lambda: Vec<f64>,
    pub reg_alpha: Vec<f64>,
    /// Use GOSS sampling instead of uniform subsampling
    pub goss: bool,
}

impl Default for BoostingSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 300, 500],
            learning_rate: vec![0.01, 0.05, 0.1],
            max_leaves: vec![15, 31, 63],
            max_depth: vec![None, Some(8), Some(12)],
            min_child_samples: vec![10, 20, 40],
            subsample: vec![0.7, 0.85, 1.0],
            colsample_bytree: vec![0.7, 0.85, 1.0],
            reg_lambda: vec![0.0, 1.0, 5.0],
            reg_alpha: vec![0.0],
            goss: false,
        }
    }
}

/// Configuration for model training and hyperparameter search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Families to train, in order
    pub models: Vec<ModelFamily>,
    /// Folds for the exhaustive grid search
    pub grid_cv_folds: usize,
    /// Folds for the randomized searches
    pub random_cv_folds: usize,
    /// Configurations drawn per randomized search
    pub n_iter: usize,
    pub scoring: Scoring,
    pub seed: u64,
    pub ridge: RidgeSpace,
    pub forest: ForestSpace,
    pub boosting: BoostingSpace,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            models: ModelFamily::ALL.to_vec(),
            grid_cv_folds: 5,
            random_cv_folds: 3,
            n_iter: 10,
            scoring: Scoring::R2,
            seed: 42,
            ridge: RidgeSpace::default(),
            forest: ForestSpace::default(),
            boosting: BoostingSpace::default(),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, models: Vec<ModelFamily>) -> Self {
        self.models = models;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// Set both the grid and the randomized fold counts
    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.grid_cv_folds = folds;
        self.random_cv_folds = folds;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(ValuationError::ConfigError("no model families selected".to_string()));
        }
        if self.grid_cv_folds < 2 || self.random_cv_folds < 2 {
            return Err(ValuationError::invalid_param(
                "cv_folds",
                self.grid_cv_folds.min(self.random_cv_folds),
                "must be at least 2",
            ));
        }
        if self.n_iter == 0 {
            return Err(ValuationError::invalid_param("n_iter", 0, "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_family_parsing() {
        assert_eq!("ridge".parse::<ModelFamily>().unwrap(), ModelFamily::Ridge);
        assert_eq!("random-forest".parse::<ModelFamily>().unwrap(), ModelFamily::RandomForest);
        assert_eq!("LightGBM".parse::<ModelFamily>().unwrap(), ModelFamily::LightGbm);
        assert!("svm".parse::<ModelFamily>().is_err());
        assert_eq!(ModelFamily::LightGbm.to_string(), "lightgbm");
    }

    #[test]
    fn test_scoring() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(Scoring::R2.score(&y, &y), 1.0);
        assert_eq!(Scoring::NegMae.score(&y, &array![2.0, 3.0, 4.0]), -1.0);
        assert_eq!(Scoring::NegRmse.score(&y, &array![3.0, 4.0, 5.0]), -2.0);
        assert_eq!(Scoring::R2.score(&array![2.0, 2.0], &array![1.0, 3.0]), 0.0);
    }

    #[test]
    fn test_defaults_and_validation() {
        let config = TrainingConfig::default();
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.grid_cv_folds, 5);
        assert_eq!(config.random_cv_folds, 3);
        assert!(config.validate().is_ok());
        assert!(TrainingConfig::new().with_cv_folds(1).validate().is_err());
        assert!(TrainingConfig::new().with_models(vec![]).validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip_with_partial_input() {
        let config: TrainingConfig = serde_json::from_str(r#"{"n_iter": 4, "models": ["ridge"]}"#).unwrap();
        assert_eq!(config.n_iter, 4);
        assert_eq!(config.models, vec![ModelFamily::Ridge]);
        assert_eq!(config.seed, 42);
    }
}
