//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! Key differences from level-wise gradient boosting:
//! - Leaf-wise (best-first) tree growth capped by `max_leaves`
//! - Gradient-based One-Side Sampling (GOSS): keeps the largest gradients,
//!   samples the rest and up-weights them to keep the gradient sum unbiased
//! - L1 and L2 regularization of leaf weights

use super::decision_tree::TreeNode;
use crate::error::{Result, ValuationError};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Row sampling strategy per boosting round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Boosting {
    /// Plain gradient boosting with optional uniform `subsample`
    Gbdt,
    /// Gradient-based one-side sampling
    Goss { top_rate: f64, other_rate: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightGBMConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub boosting: Boosting,
    pub random_state: u64,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            boosting: Boosting::Gbdt,
            random_state: 42,
        }
    }
}

impl LightGBMConfig {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ValuationError::invalid_param("n_estimators", 0, "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ValuationError::invalid_param("learning_rate", self.learning_rate, "must be positive"));
        }
        if self.max_leaves < 2 {
            return Err(ValuationError::invalid_param("max_leaves", self.max_leaves, "must be at least 2"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ValuationError::invalid_param("subsample", self.subsample, "must be in (0, 1]"));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(ValuationError::invalid_param(
                "colsample_bytree",
                self.colsample_bytree,
                "must be in (0, 1]",
            ));
        }
        if self.reg_lambda < 0.0 || self.reg_alpha < 0.0 {
            return Err(ValuationError::invalid_param(
                "reg_lambda",
                self.reg_lambda,
                "regularization must be non-negative",
            ));
        }
        if let Boosting::Goss { top_rate, other_rate } = self.boosting {
            if top_rate <= 0.0 || other_rate <= 0.0 || top_rate + other_rate > 1.0 {
                return Err(ValuationError::invalid_param(
                    "top_rate",
                    top_rate,
                    "GOSS rates must be positive and sum to at most 1",
                ));
            }
        }
        Ok(())
    }
}

// ---- Tree building utilities ----

fn soft_threshold(g: f64, alpha: f64) -> f64 {
    if g.abs() <= alpha {
        0.0
    } else {
        g - alpha * g.signum()
    }
}

fn compute_leaf_weight(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    -soft_threshold(g, alpha) / denom
}

fn compute_gain_single(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let denom = h + lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    let t = soft_threshold(g, alpha);
    t * t / denom
}

/// Per-round gradient statistics (already GOSS-weighted)
struct GradStats<'a> {
    gradients: &'a [f64],
    hessians: &'a [f64],
}

impl GradStats<'_> {
    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.gradients[i], h + self.hessians[i]))
    }
}

struct SplitResult {
    feature: usize,
    threshold: f64,
    gain: f64,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
}

fn find_best_split_for_feature(
    x: &Array2<f64>,
    stats: &GradStats<'_>,
    indices: &[usize],
    feature: usize,
    config: &LightGBMConfig,
) -> Option<SplitResult> {
    let mut sorted: Vec<(usize, f64)> = indices.iter().map(|&i| (i, x[[i, feature]])).collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let (total_g, total_h) = stats.sums(indices);
    let (lambda, alpha) = (config.reg_lambda, config.reg_alpha);
    let base_score = compute_gain_single(total_g, total_h, lambda, alpha);
    let min_child = config.min_child_samples.max(1);

    let mut left_g = 0.0;
    let mut left_h = 0.0;
    let mut best_gain = 0.0;
    let mut best: Option<(f64, usize)> = None;

    for i in 0..sorted.len().saturating_sub(1) {
        left_g += stats.gradients[sorted[i].0];
        left_h += stats.hessians[sorted[i].0];
        if i + 1 < min_child || sorted.len() - i - 1 < min_child {
            continue;
        }
        if sorted[i].1 == sorted[i + 1].1 {
            continue;
        }
        let gain = compute_gain_single(left_g, left_h, lambda, alpha)
            + compute_gain_single(total_g - left_g, total_h - left_h, lambda, alpha)
            - base_score;
        if gain > best_gain {
            best_gain = gain;
            let (lo, hi) = (sorted[i].1, sorted[i + 1].1);
            // Adjacent floats can round the midpoint up to `hi`
            let mid = (lo + hi) / 2.0;
            let threshold = if mid < hi { mid } else { lo };
            best = Some((threshold, i + 1));
        }
    }

    let (threshold, pos) = best?;
    Some(SplitResult {
        feature,
        threshold,
        gain: best_gain,
        left_indices: sorted[..pos].iter().map(|&(i, _)| i).collect(),
        right_indices: sorted[pos..].iter().map(|&(i, _)| i).collect(),
    })
}

fn best_split(
    x: &Array2<f64>,
    stats: &GradStats<'_>,
    indices: &[usize],
    features: &[usize],
    config: &LightGBMConfig,
) -> Option<SplitResult> {
    if indices.len() < config.min_child_samples.max(1) * 2 {
        return None;
    }
    let candidates: Vec<SplitResult> = features
        .par_iter()
        .filter_map(|&feat| find_best_split_for_feature(x, stats, indices, feat, config))
        .collect();
    // First strictly-best candidate wins so results do not depend on thread timing
    candidates.into_iter().fold(None, |acc: Option<SplitResult>, c| match acc {
        Some(a) if a.gain >= c.gain => Some(a),
        _ => Some(c),
    })
}

struct PendingSplit {
    node_id: usize,
    split: SplitResult,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .partial_cmp(&other.split.gain)
            .unwrap_or(Ordering::Equal)
            // Equal gains: lower node id first
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

enum NodeSlot {
    Leaf(Vec<usize>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        gain: f64,
    },
}

/// Build one tree using the leaf-wise (best-first) strategy
fn build_lgb_tree(
    x: &Array2<f64>,
    stats: &GradStats<'_>,
    indices: &[usize],
    features: &[usize],
    config: &LightGBMConfig,
) -> TreeNode {
    let mut nodes: Vec<NodeSlot> = vec![NodeSlot::Leaf(indices.to_vec())];
    let mut depths: Vec<usize> = vec![0];
    let mut heap: BinaryHeap<PendingSplit> = BinaryHeap::new();
    let max_depth = config.max_depth.unwrap_or(usize::MAX);

    if max_depth > 0 {
        if let Some(split) = best_split(x, stats, indices, features, config) {
            heap.push(PendingSplit { node_id: 0, split });
        }
    }

    let mut n_leaves = 1usize;
    while n_leaves < config.max_leaves {
        let Some(PendingSplit { node_id, split }) = heap.pop() else {
            break;
        };
        let depth = depths[node_id];
        let left_id = nodes.len();
        let right_id = left_id + 1;
        let n_samples = split.left_indices.len() + split.right_indices.len();

        if depth + 1 < max_depth {
            for (child_id, child) in [(left_id, &split.left_indices), (right_id, &split.right_indices)] {
                if let Some(child_split) = best_split(x, stats, child, features, config) {
                    heap.push(PendingSplit {
                        node_id: child_id,
                        split: child_split,
                    });
                }
            }
        }

        nodes.push(NodeSlot::Leaf(split.left_indices));
        nodes.push(NodeSlot::Leaf(split.right_indices));
        depths.push(depth + 1);
        depths.push(depth + 1);
        nodes[node_id] = NodeSlot::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
            n_samples,
            gain: split.gain,
        };
        n_leaves += 1;
    }

    fn to_node(nodes: &[NodeSlot], idx: usize, stats: &GradStats<'_>, config: &LightGBMConfig) -> TreeNode {
        match &nodes[idx] {
            NodeSlot::Leaf(indices) => {
                let (g, h) = stats.sums(indices);
                TreeNode::Leaf {
                    value: compute_leaf_weight(g, h, config.reg_lambda, config.reg_alpha),
                    n_samples: indices.len(),
                }
            }
            NodeSlot::Split { feature, threshold, left, right, n_samples, gain } => TreeNode::Split {
                feature_idx: *feature,
                threshold: *threshold,
                left: Box::new(to_node(nodes, *left, stats, config)),
                right: Box::new(to_node(nodes, *right, stats, config)),
                n_samples: *n_samples,
                gain: *gain,
            },
        }
    }
    to_node(&nodes, 0, stats, config)
}

/// GOSS row selection. Returns the selected rows and the weight applied to
/// the sampled small-gradient rows.
fn goss_sample(
    gradients: &[f64],
    top_rate: f64,
    other_rate: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> (Vec<usize>, Vec<usize>, f64) {
    let n = gradients.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = ((n as f64 * other_rate).ceil() as usize).min(n - n_top);
    let mut sorted: Vec<usize> = (0..n).collect();
    sorted.sort_by(|&a, &b| {
        gradients[b]
            .abs()
            .partial_cmp(&gradients[a].abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    let top = sorted[..n_top].to_vec();
    let mut rest = sorted[n_top..].to_vec();
    rest.shuffle(rng);
    rest.truncate(n_other);
    let amplify = (1.0 - top_rate) / other_rate;
    (top, rest, amplify)
}

// ============ LightGBM Regressor ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMRegressor {
    pub config: LightGBMConfig,
    trees: Vec<TreeNode>,
    base_prediction: f64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl LightGBMRegressor {
    pub fn new(config: LightGBMConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn trees(&self) -> &[TreeNode] {
        &self.trees
    }

    pub fn base_prediction(&self) -> f64 {
        self.base_prediction
    }

    pub fn learning_rate(&self) -> f64 {
        self.config.learning_rate
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(ValuationError::TrainingError("Empty dataset".into()));
        }
        if n != y.len() {
            return Err(ValuationError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.config.validate()?;

        let n_features = x.ncols();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.base_prediction = y.mean().unwrap_or(0.0);
        self.n_features = n_features;
        self.trees.clear();
        let mut predictions = Array1::from_elem(n, self.base_prediction);
        let n_selected = ((n_features as f64 * self.config.colsample_bytree).ceil() as usize).clamp(1, n_features.max(1));

        for _ in 0..self.config.n_estimators {
            let raw_gradients: Vec<f64> = predictions.iter().zip(y.iter()).map(|(&p, &yi)| p - yi).collect();
            let mut gradients = raw_gradients.clone();
            let mut hessians = vec![1.0; n];

            let mut indices = match self.config.boosting {
                Boosting::Goss { top_rate, other_rate } => {
                    let (mut top, rest, amplify) = goss_sample(&raw_gradients, top_rate, other_rate, &mut rng);
                    for &i in &rest {
                        gradients[i] *= amplify;
                        hessians[i] *= amplify;
                    }
                    top.extend(rest);
                    top
                }
                Boosting::Gbdt if self.config.subsample < 1.0 => {
                    let k = ((n as f64 * self.config.subsample).ceil() as usize).max(1);
                    let mut idx: Vec<usize> = (0..n).collect();
                    idx.shuffle(&mut rng);
                    idx.truncate(k);
                    idx
                }
                Boosting::Gbdt => (0..n).collect(),
            };
            indices.sort_unstable();

            let mut features: Vec<usize> = (0..n_features).collect();
            if n_selected < n_features {
                features.shuffle(&mut rng);
                features.truncate(n_selected);
                features.sort_unstable();
            }

            let stats = GradStats {
                gradients: &gradients,
                hessians: &hessians,
            };
            let tree = build_lgb_tree(x, &stats, &indices, &features, &self.config);
            for (i, row) in x.rows().into_iter().enumerate() {
                predictions[i] += self.config.learning_rate * tree.predict_row(&row);
            }
            self.trees.push(tree);
        }

        let mut importances = vec![0.0; n_features];
        for tree in &self.trees {
            tree.accumulate_gain(&mut importances);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ValuationError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ValuationError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let lr = self.config.learning_rate;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.base_prediction + lr * self.trees.iter().map(|t| t.predict_row(&row)).sum::<f64>())
            .collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 3), |(i, j)| match j {
            0 => i as f64 / 10.0,
            1 => ((i * 7) % 10) as f64,
            _ => ((i * 3) % 5) as f64,
        });
        let y = Array1::from_shape_fn(100, |i| {
            let x0 = i as f64 / 10.0;
            2.0 * x0 + if x0 > 5.0 { 10.0 } else { 0.0 }
        });
        (x, y)
    }

    fn r2(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
        let ym = y.mean().unwrap();
        1.0 - (p - y).mapv(|v| v * v).sum() / y.mapv(|v| (v - ym).powi(2)).sum()
    }

    #[test]
    fn test_lightgbm_regressor() {
        let (x, y) = make_regression_data();
        let config = LightGBMConfig { n_estimators: 50, max_leaves: 8, min_child_samples: 2, ..Default::default() };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        assert_eq!(preds.len(), 100);
        assert!(r2(&y, &preds) > 0.95);
        let imp = model.feature_importances().unwrap();
        assert!(imp[0] > imp[1] && imp[0] > imp[2]);
    }

    #[test]
    fn test_adjacent_float_split_routes_like_training() {
        let a = 1.0 + f64::EPSILON;
        let b = 1.0 + 2.0 * f64::EPSILON;
        let x = Array2::from_shape_vec((4, 1), vec![a, a, b, b]).unwrap();
        let y = Array1::from(vec![0.0, 0.0, 100.0, 100.0]);
        let config = LightGBMConfig {
            n_estimators: 1,
            learning_rate: 1.0,
            max_leaves: 2,
            min_child_samples: 1,
            ..Default::default()
        };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-9, "predicted {} for target {}", p, t);
        }
    }

    #[test]
    fn test_leaf_budget_respected() {
        let (x, y) = make_regression_data();
        let config = LightGBMConfig { n_estimators: 5, max_leaves: 4, min_child_samples: 1, ..Default::default() };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        assert!(model.trees().iter().all(|t| t.n_leaves() <= 4));
    }

    #[test]
    fn test_max_depth_respected() {
        let (x, y) = make_regression_data();
        let config = LightGBMConfig {
            n_estimators: 5,
            max_leaves: 31,
            max_depth: Some(2),
            min_child_samples: 1,
            ..Default::default()
        };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        assert!(model.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_lightgbm_goss() {
        let (x, y) = make_regression_data();
        let config = LightGBMConfig {
            n_estimators: 30,
            max_leaves: 8,
            min_child_samples: 2,
            boosting: Boosting::Goss { top_rate: 0.3, other_rate: 0.2 },
            colsample_bytree: 0.7,
            ..Default::default()
        };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        assert!(r2(&y, &model.predict(&x).unwrap()) > 0.8);
    }

    #[test]
    fn test_strong_l1_gives_flat_model() {
        let (x, y) = make_regression_data();
        let config = LightGBMConfig { n_estimators: 3, reg_alpha: 1e9, min_child_samples: 2, ..Default::default() };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let mean = y.mean().unwrap();
        assert!(preds.iter().all(|p| (p - mean).abs() < 1e-9));
    }

    #[test]
    fn test_invalid_config() {
        let (x, y) = make_regression_data();
        let mut model = LightGBMRegressor::new(LightGBMConfig { learning_rate: 0.0, ..Default::default() });
        assert!(model.fit(&x, &y).is_err());
        let model = LightGBMRegressor::new(LightGBMConfig::default());
        assert!(matches!(model.predict(&x), Err(ValuationError::ModelNotFitted)));
    }
}
