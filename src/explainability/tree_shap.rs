//! Exact path-dependent TreeSHAP (Lundberg et al., Algorithm 2)
//!
//! Runs in O(leaves * depth^2) per tree and row. Node sample counts act as
//! cover: a feature outside the coalition sends the row down both children
//! in proportion to how many training rows went each way.

use crate::training::TreeNode;
use ndarray::ArrayView1;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// `None` for the root placeholder
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one = path[depth].pweight;

    for j in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[j].pweight;
            path[j].pweight = next_one * denom / ((j + 1) as f64 * one_fraction);
            next_one = tmp - path[j].pweight * zero_fraction * (depth - j) as f64 / denom;
        } else {
            path[j].pweight = path[j].pweight * denom / (zero_fraction * (depth - j) as f64);
        }
    }

    for j in index..depth {
        path[j].feature = path[j + 1].feature;
        path[j].zero_fraction = path[j + 1].zero_fraction;
        path[j].one_fraction = path[j + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `index` removed
fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one = path[depth].pweight;
    let mut total = 0.0;

    for j in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one * denom / ((j + 1) as f64 * one_fraction);
            total += tmp;
            next_one = path[j].pweight - tmp * zero_fraction * (depth - j) as f64 / denom;
        } else if zero_fraction != 0.0 {
            total += path[j].pweight / zero_fraction / ((depth - j) as f64 / denom);
        }
    }
    total
}

fn cover_ratio(child: &TreeNode, parent_cover: usize) -> f64 {
    if parent_cover == 0 {
        0.5
    } else {
        child.n_samples() as f64 / parent_cover as f64
    }
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    node: &TreeNode,
    row: &ArrayView1<f64>,
    phi: &mut [f64],
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
    scale: f64,
) {
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    match node {
        TreeNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                let el = path[i];
                if let Some(f) = el.feature {
                    let w = unwound_path_sum(&path, i);
                    phi[f] += scale * w * (el.one_fraction - el.zero_fraction) * value;
                }
            }
        }
        TreeNode::Split { feature_idx, threshold, left, right, n_samples, .. } => {
            let (hot, cold) = if row[*feature_idx] <= *threshold {
                (left.as_ref(), right.as_ref())
            } else {
                (right.as_ref(), left.as_ref())
            };

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(*feature_idx)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind_path(&mut path, k);
            }

            recurse(
                hot,
                row,
                phi,
                path.clone(),
                incoming_zero * cover_ratio(hot, *n_samples),
                incoming_one,
                Some(*feature_idx),
                scale,
            );
            recurse(
                cold,
                row,
                phi,
                path,
                incoming_zero * cover_ratio(cold, *n_samples),
                0.0,
                Some(*feature_idx),
                scale,
            );
        }
    }
}

/// Add `scale` times the SHAP values of `row` under `tree` into `phi`
pub fn tree_shap(tree: &TreeNode, row: &ArrayView1<f64>, phi: &mut [f64], scale: f64) {
    recurse(tree, row, phi, Vec::with_capacity(tree.depth() + 2), 1.0, 1.0, None, scale);
}
