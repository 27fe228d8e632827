//! SHAP explainers for the trained model families

use super::local_explanations::{FeatureContribution, LocalExplanation};
use super::tree_shap::tree_shap;
use crate::error::{Result, ValuationError};
use crate::training::{LightGBMRegressor, ModelKind, RandomForest, RidgeRegression, TrainedModel, TreeNode};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

/// Additive per-feature attribution of a model's output
pub trait ShapExplainer: Send + Sync {
    /// Expected model output
    fn base_value(&self) -> f64;

    fn n_features(&self) -> usize;

    /// Model output for one row
    fn predict_row(&self, row: &ArrayView1<f64>) -> f64;

    /// One contribution per feature; sums to `predict_row - base_value`
    fn shap_values(&self, row: &ArrayView1<f64>) -> Array1<f64>;

    /// Explain every row of `x`, in order
    fn explain(&self, x: &Array2<f64>, feature_names: &[String]) -> Result<Vec<LocalExplanation>> {
        if x.ncols() != self.n_features() {
            return Err(ValuationError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(ValuationError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        let base_value = self.base_value();
        let rows: Vec<ArrayView1<f64>> = x.rows().into_iter().collect();
        Ok(rows
            .par_iter()
            .enumerate()
            .map(|(instance_index, row)| {
                let phi = self.shap_values(row);
                let contributions = phi
                    .iter()
                    .enumerate()
                    .map(|(j, &c)| FeatureContribution {
                        feature_index: j,
                        feature_name: feature_names[j].clone(),
                        feature_value: row[j],
                        contribution: c,
                    })
                    .collect();
                LocalExplanation {
                    instance_index,
                    base_value,
                    prediction: self.predict_row(row),
                    contributions,
                }
            })
            .collect())
    }
}

/// Exact TreeSHAP over an additive tree ensemble `offset + scale * sum(trees)`
#[derive(Debug, Clone)]
pub struct TreeExplainer<'a> {
    trees: Vec<&'a TreeNode>,
    scale: f64,
    offset: f64,
    n_features: usize,
    base_value: f64,
}

impl<'a> TreeExplainer<'a> {
    fn new(trees: Vec<&'a TreeNode>, scale: f64, offset: f64, n_features: usize) -> Result<Self> {
        if trees.is_empty() {
            return Err(ValuationError::ModelNotFitted);
        }
        let base_value = offset + scale * trees.iter().map(|t| t.expected_value()).sum::<f64>();
        Ok(Self {
            trees,
            scale,
            offset,
            n_features,
            base_value,
        })
    }

    /// Forest output is the mean over trees
    pub fn from_forest(forest: &'a RandomForest, n_features: usize) -> Result<Self> {
        let trees: Vec<&TreeNode> = forest.trees().iter().filter_map(|t| t.root()).collect();
        let scale = 1.0 / trees.len().max(1) as f64;
        Self::new(trees, scale, 0.0, n_features)
    }

    /// Boosted output is the base score plus the learning-rate-scaled sum
    pub fn from_boosting(model: &'a LightGBMRegressor, n_features: usize) -> Result<Self> {
        Self::new(
            model.trees().iter().collect(),
            model.learning_rate(),
            model.base_prediction(),
            n_features,
        )
    }
}

impl ShapExplainer for TreeExplainer<'_> {
    fn base_value(&self) -> f64 {
        self.base_value
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &ArrayView1<f64>) -> f64 {
        self.offset + self.scale * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    fn shap_values(&self, row: &ArrayView1<f64>) -> Array1<f64> {
        let mut phi = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree_shap(tree, row, &mut phi, self.scale);
        }
        Array1::from_vec(phi)
    }
}

/// Exact SHAP for a linear model with independent features: `coef_j * (x_j - mean_j)`
#[derive(Debug, Clone)]
pub struct LinearExplainer<'a> {
    coefficients: &'a Array1<f64>,
    means: &'a Array1<f64>,
    intercept: f64,
}

impl<'a> LinearExplainer<'a> {
    pub fn new(model: &'a RidgeRegression) -> Result<Self> {
        match (&model.coefficients, &model.feature_means) {
            (Some(coefficients), Some(means)) => Ok(Self {
                coefficients,
                means,
                intercept: model.intercept.unwrap_or(0.0),
            }),
            _ => Err(ValuationError::ModelNotFitted),
        }
    }
}

impl ShapExplainer for LinearExplainer<'_> {
    fn base_value(&self) -> f64 {
        self.intercept + self.coefficients.dot(self.means)
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_row(&self, row: &ArrayView1<f64>) -> f64 {
        self.intercept + self.coefficients.dot(row)
    }

    fn shap_values(&self, row: &ArrayView1<f64>) -> Array1<f64> {
        (row - self.means) * self.coefficients
    }
}

/// Explainer matching the trained model's family
pub fn explainer_for(model: &TrainedModel) -> Result<Box<dyn ShapExplainer + '_>> {
    let n_features = model.feature_names.len();
    Ok(match &model.model {
        ModelKind::Ridge(m) => Box::new(LinearExplainer::new(m)?),
        ModelKind::RandomForest(m) => Box::new(TreeExplainer::from_forest(m, n_features)?),
        ModelKind::LightGbm(m) => Box::new(TreeExplainer::from_boosting(m, n_features)?),
    })
}
