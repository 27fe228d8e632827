//! Regressor trait, hyperparameter sets and the trained-model container

use super::config::ModelFamily;
use super::lightgbm::{Boosting, LightGBMConfig, LightGBMRegressor};
use super::linear_models::RidgeRegression;
use super::random_forest::{MaxFeatures, RandomForest};
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common interface of every estimator the trainer can fit
pub trait Regressor: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Normalized feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RidgeRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RidgeRegression::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        RidgeRegression::feature_importances(self)
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        RandomForest::feature_importances(self).cloned()
    }
}

impl Regressor for LightGBMRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LightGBMRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LightGBMRegressor::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        LightGBMRegressor::feature_importances(self).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub goss: bool,
}

/// One point of a search space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum HyperParams {
    Ridge { alpha: f64 },
    RandomForest(ForestParams),
    LightGbm(BoostingParams),
}

fn depth_str(depth: Option<usize>) -> String {
    depth.map_or_else(|| "none".to_string(), |d| d.to_string())
}

impl HyperParams {
    pub fn family(&self) -> ModelFamily {
        match self {
            HyperParams::Ridge { .. } => ModelFamily::Ridge,
            HyperParams::RandomForest(_) => ModelFamily::RandomForest,
            HyperParams::LightGbm(_) => ModelFamily::LightGbm,
        }
    }

    /// Unfitted estimator configured with these parameters
    pub fn build(&self, seed: u64) -> ModelKind {
        match *self {
            HyperParams::Ridge { alpha } => ModelKind::Ridge(RidgeRegression::new(alpha)),
            HyperParams::RandomForest(p) => ModelKind::RandomForest(
                RandomForest::new(p.n_estimators)
                    .with_max_depth(p.max_depth)
                    .with_min_samples_split(p.min_samples_split)
                    .with_min_samples_leaf(p.min_samples_leaf)
                    .with_max_features(p.max_features)
                    .with_random_state(seed),
            ),
            HyperParams::LightGbm(p) => {
                let boosting = if p.goss {
                    Boosting::Goss {
                        top_rate: 0.2,
                        other_rate: 0.1,
                    }
                } else {
                    Boosting::Gbdt
                };
                ModelKind::LightGbm(LightGBMRegressor::new(LightGBMConfig {
                    n_estimators: p.n_estimators,
                    learning_rate: p.learning_rate,
                    max_leaves: p.max_leaves,
                    max_depth: p.max_depth,
                    min_child_samples: p.min_child_samples,
                    reg_lambda: p.reg_lambda,
                    reg_alpha: p.reg_alpha,
                    subsample: p.subsample,
                    colsample_bytree: p.colsample_bytree,
                    boosting,
                    random_state: seed,
                }))
            }
        }
    }

    /// Parameter name -> value, for reports
    pub fn describe(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut put = |k: &str, v: String| {
            out.insert(k.to_string(), v);
        };
        match self {
            HyperParams::Ridge { alpha } => put("alpha", alpha.to_string()),
            HyperParams::RandomForest(p) => {
                put("n_estimators", p.n_estimators.to_string());
                put("max_depth", depth_str(p.max_depth));
                put("min_samples_split", p.min_samples_split.to_string());
                put("min_samples_leaf", p.min_samples_leaf.to_string());
                put("max_features", p.max_features.to_string());
            }
            HyperParams::LightGbm(p) => {
                put("n_estimators", p.n_estimators.to_string());
                put("learning_rate", p.learning_rate.to_string());
                put("max_leaves", p.max_leaves.to_string());
                put("max_depth", depth_str(p.max_depth));
                put("min_child_samples", p.min_child_samples.to_string());
                put("subsample", p.subsample.to_string());
                put("colsample_bytree", p.colsample_bytree.to_string());
                put("reg_lambda", p.reg_lambda.to_string());
                put("reg_alpha", p.reg_alpha.to_string());
                put("goss", p.goss.to_string());
            }
        }
        out
    }
}

/// Enum to hold fitted model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelKind {
    Ridge(RidgeRegression),
    RandomForest(RandomForest),
    LightGbm(LightGBMRegressor),
}

impl ModelKind {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelKind::Ridge(_) => ModelFamily::Ridge,
            ModelKind::RandomForest(_) => ModelFamily::RandomForest,
            ModelKind::LightGbm(_) => ModelFamily::LightGbm,
        }
    }

    fn as_regressor(&self) -> &dyn Regressor {
        match self {
            ModelKind::Ridge(m) => m,
            ModelKind::RandomForest(m) => m,
            ModelKind::LightGbm(m) => m,
        }
    }

    fn as_regressor_mut(&mut self) -> &mut dyn Regressor {
        match self {
            ModelKind::Ridge(m) => m,
            ModelKind::RandomForest(m) => m,
            ModelKind::LightGbm(m) => m,
        }
    }
}

impl Regressor for ModelKind {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_regressor_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_regressor().predict(x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.as_regressor().feature_importances()
    }
}

/// Best estimator of one family, refit on the full training partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub family: ModelFamily,
    pub params: HyperParams,
    /// Mean cross-validated score of the selected parameters
    pub cv_score: f64,
    pub cv_std: f64,
    pub model: ModelKind,
    pub feature_names: Vec<String>,
    pub training_time_secs: f64,
}

impl TrainedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.predict(x)
    }

    /// Importances paired with feature names, highest first
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let Some(imp) = self.model.feature_importances() else {
            return Vec::new();
        };
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(imp.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_build_and_fit_through_trait() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0], [6.0, 1.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0];
        let params = [
            HyperParams::Ridge { alpha: 0.01 },
            HyperParams::RandomForest(ForestParams {
                n_estimators: 5,
                max_depth: Some(3),
                min_samples_split: 2,
                min_samples_leaf: 1,
                max_features: MaxFeatures::All,
            }),
            HyperParams::LightGbm(BoostingParams {
                n_estimators: 10,
                learning_rate: 0.3,
                max_leaves: 4,
                max_depth: None,
                min_child_samples: 1,
                subsample: 1.0,
                colsample_bytree: 1.0,
                reg_lambda: 0.0,
                reg_alpha: 0.0,
                goss: false,
            }),
        ];
        for p in params {
            let mut model = p.build(7);
            assert_eq!(model.family(), p.family());
            model.fit(&x, &y).unwrap();
            assert_eq!(model.predict(&x).unwrap().len(), 6);
            let imp = model.feature_importances().unwrap();
            assert_eq!(imp.len(), 2);
        }
    }

    #[test]
    fn test_describe() {
        let d = HyperParams::Ridge { alpha: 10.0 }.describe();
        assert_eq!(d["alpha"], "10");
    }

    #[test]
    fn test_params_serde_tagged() {
        let json = serde_json::to_string(&HyperParams::Ridge { alpha: 1.0 }).unwrap();
        assert!(json.contains("\"family\":\"ridge\""));
        let back: HyperParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, HyperParams::Ridge { alpha: 1.0 });
    }
}
