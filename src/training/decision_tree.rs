//! Regression tree (CART, squared error)

use crate::error::{Result, ValuationError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tree node shared by the forest and the boosted ensemble.
///
/// `n_samples` is the number of training rows that reached the node and is
/// used as cover by the TreeSHAP explainer. Serialized as a flat preorder
/// node list so deep trees stay within JSON nesting limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FlatTree", try_from = "FlatTree")]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        /// Loss reduction achieved by this split
        gain: f64,
    },
}

impl TreeNode {
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    /// Route one row to its leaf value
    pub fn predict_row(&self, row: &ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    /// Cover-weighted mean of leaf values
    pub fn expected_value(&self) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { left, right, n_samples, .. } => {
                if *n_samples == 0 {
                    return 0.5 * (left.expected_value() + right.expected_value());
                }
                (left.n_samples() as f64 * left.expected_value()
                    + right.n_samples() as f64 * right.expected_value())
                    / *n_samples as f64
            }
        }
    }

    /// Add each split's gain to its feature's slot
    pub(crate) fn accumulate_gain(&self, out: &mut [f64]) {
        if let TreeNode::Split { feature_idx, left, right, gain, .. } = self {
            if *feature_idx < out.len() {
                out[*feature_idx] += gain;
            }
            left.accumulate_gain(out);
            right.accumulate_gain(out);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FlatNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        gain: f64,
    },
}

/// Preorder node list; children always follow their parent
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatTree {
    nodes: Vec<FlatNode>,
}

fn flatten(node: &TreeNode, nodes: &mut Vec<FlatNode>) -> usize {
    let idx = nodes.len();
    match node {
        TreeNode::Leaf { value, n_samples } => nodes.push(FlatNode::Leaf {
            value: *value,
            n_samples: *n_samples,
        }),
        TreeNode::Split { feature_idx, threshold, left, right, n_samples, gain } => {
            // Placeholder until the child indices are known
            nodes.push(FlatNode::Leaf { value: 0.0, n_samples: 0 });
            let left = flatten(left, nodes);
            let right = flatten(right, nodes);
            nodes[idx] = FlatNode::Split {
                feature_idx: *feature_idx,
                threshold: *threshold,
                left,
                right,
                n_samples: *n_samples,
                gain: *gain,
            };
        }
    }
    idx
}

fn unflatten(nodes: &[FlatNode], idx: usize) -> std::result::Result<TreeNode, String> {
    match nodes.get(idx) {
        None => Err(format!("tree node {} out of range ({} nodes)", idx, nodes.len())),
        Some(FlatNode::Leaf { value, n_samples }) => Ok(TreeNode::Leaf {
            value: *value,
            n_samples: *n_samples,
        }),
        Some(FlatNode::Split { feature_idx, threshold, left, right, n_samples, gain }) => {
            if *left <= idx || *right <= idx {
                return Err(format!("tree node {} points back to an earlier node", idx));
            }
            Ok(TreeNode::Split {
                feature_idx: *feature_idx,
                threshold: *threshold,
                left: Box::new(unflatten(nodes, *left)?),
                right: Box::new(unflatten(nodes, *right)?),
                n_samples: *n_samples,
                gain: *gain,
            })
        }
    }
}

impl From<TreeNode> for FlatTree {
    fn from(root: TreeNode) -> Self {
        let mut nodes = Vec::new();
        flatten(&root, &mut nodes);
        FlatTree { nodes }
    }
}

impl TryFrom<FlatTree> for TreeNode {
    type Error = String;

    fn try_from(tree: FlatTree) -> std::result::Result<Self, Self::Error> {
        unflatten(&tree.nodes, 0)
    }
}

/// Best split found for one feature
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// CART regression tree with optional per-split feature subsampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered at each split (all when `None`)
    pub max_features: Option<usize>,
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(ValuationError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ValuationError::TrainingError("cannot fit a tree on zero rows".to_string()));
        }

        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut importances = vec![0.0; self.n_features];
        let indices: Vec<usize> = (0..n_samples).collect();

        let root = self.build_tree(x, y, &indices, 0, &mut rng, &mut importances);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let mean = sum / n_samples as f64;
        let leaf = TreeNode::Leaf { value: mean, n_samples };

        let sse: f64 = indices.iter().map(|&i| (y[i] - mean).powi(2)).sum();
        if n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || sse <= 1e-12 * n_samples as f64
        {
            return leaf;
        }

        let best = match self.find_best_split(x, y, indices, sum, rng) {
            Some(s) => s,
            None => return leaf,
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature]] <= best.threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return leaf;
        }

        importances[best.feature] += best.gain;

        let left = Box::new(self.build_tree(x, y, &left_idx, depth + 1, rng, importances));
        let right = Box::new(self.build_tree(x, y, &right_idx, depth + 1, rng, importances));

        TreeNode::Split {
            feature_idx: best.feature,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            gain: best.gain,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut features = sample(rng, self.n_features, k.max(1)).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        total_sum: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let features = self.candidate_features(rng);
        let n = indices.len() as f64;
        let parent_score = total_sum * total_sum / n;
        let min_leaf = self.min_samples_leaf;

        let per_feature: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature| {
                let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
                pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

                let mut left_sum = 0.0;
                let mut best: Option<SplitCandidate> = None;
                for pos in 0..pairs.len() - 1 {
                    left_sum += pairs[pos].1;
                    let n_left = pos + 1;
                    let n_right = pairs.len() - n_left;
                    if n_left < min_leaf || n_right < min_leaf || pairs[pos].0 == pairs[pos + 1].0 {
                        continue;
                    }
                    let right_sum = total_sum - left_sum;
                    // SSE reduction = sum_l^2/n_l + sum_r^2/n_r - sum^2/n
                    let gain = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64
                        - parent_score;
                    if gain > best.map_or(0.0, |b| b.gain) {
                        best = Some(SplitCandidate {
                            feature,
                            threshold: 0.5 * (pairs[pos].0 + pairs[pos + 1].0),
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        // Strictly greater keeps the lowest feature index on ties
        per_feature.into_iter().flatten().fold(None, |acc: Option<SplitCandidate>, c| match acc {
            Some(a) if a.gain >= c.gain => Some(a),
            _ => Some(c),
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ValuationError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(ValuationError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| root.predict_row(&row)).collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = Array1::from_shape_fn(40, |i| if i < 20 { 10.0 } else { 30.0 });
        (x, y)
    }

    #[test]
    fn test_fits_step_function() {
        let (x, y) = step_data();
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        let preds = tree.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-9);
        }
        match tree.root().unwrap() {
            TreeNode::Split { feature_idx, threshold, .. } => {
                assert_eq!(*feature_idx, 0);
                assert_eq!(*threshold, 19.5);
            }
            TreeNode::Leaf { .. } => panic!("expected a split"),
        }
        let imp = tree.feature_importances().unwrap();
        assert!((imp[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deep_tree_json_round_trip() {
        // A 200-level chain would exceed serde_json's nesting limit if nested
        let mut node = TreeNode::Leaf { value: 0.0, n_samples: 1 };
        for depth in 0..200 {
            node = TreeNode::Split {
                feature_idx: depth % 3,
                threshold: depth as f64,
                left: Box::new(TreeNode::Leaf { value: depth as f64, n_samples: 1 }),
                right: Box::new(node),
                n_samples: depth + 2,
                gain: 1.0,
            };
        }
        let json = serde_json::to_string(&node).unwrap();
        let back: TreeNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.depth(), 200);
        assert_eq!(back.n_leaves(), 201);
        assert_eq!(back, node);
    }

    #[test]
    fn test_corrupt_flat_tree_rejected() {
        let json = r#"{"nodes":[{"split":{"feature_idx":0,"threshold":1.0,"left":0,"right":1,"n_samples":2,"gain":1.0}}]}"#;
        assert!(serde_json::from_str::<TreeNode>(json).is_err());
    }

    #[test]
    fn test_max_depth_zero_is_mean() {
        let (x, y) = step_data();
        let mut tree = DecisionTree::new().with_max_depth(Some(0));
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap()[0], 20.0);
        assert_eq!(tree.root().unwrap().n_leaves(), 1);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 100.0];
        let mut tree = DecisionTree::new().with_min_samples_leaf(2);
        tree.fit(&x, &y).unwrap();
        fn check(node: &TreeNode) {
            match node {
                TreeNode::Leaf { n_samples, .. } => assert!(*n_samples >= 2),
                TreeNode::Split { left, right, .. } => {
                    check(left);
                    check(right);
                }
            }
        }
        check(tree.root().unwrap());
    }

    #[test]
    fn test_expected_value_is_training_mean() {
        let (x, y) = step_data();
        let mut tree = DecisionTree::new().with_max_depth(Some(3));
        tree.fit(&x, &y).unwrap();
        assert!((tree.root().unwrap().expected_value() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_predict_errors() {
        let tree = DecisionTree::new();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(ValuationError::ModelNotFitted)));

        let (x, y) = step_data();
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        assert!(tree.predict(&array![[1.0, 2.0, 3.0]]).is_err());
    }

    #[test]
    fn test_feature_subset_is_seeded() {
        let (x, y) = step_data();
        let mut a = DecisionTree::new().with_max_features(Some(1)).with_random_state(7);
        let mut b = DecisionTree::new().with_max_features(Some(1)).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.root(), b.root());
    }
}
