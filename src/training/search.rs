//! Hyperparameter search: exhaustive grid and seeded random sampling
//!
//! Every candidate is scored by K-fold cross-validation. Candidates are
//! evaluated in parallel but results are kept in candidate order, so the
//! winner (highest mean score, earliest on ties) does not depend on scheduling.

use super::config::{BoostingSpace, ForestSpace, Scoring};
use super::cross_validation::{CVResults, CVSplit, CrossValidator};
use super::models::{BoostingParams, ForestParams, HyperParams, Regressor};
use crate::error::{Result, ValuationError};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Outcome of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: HyperParams,
    pub cv: Option<CVResults>,
    pub error: Option<String>,
}

/// Search summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best_params: HyperParams,
    pub best_score: f64,
    pub best_std: f64,
    pub candidates: Vec<CandidateResult>,
}

impl SearchResult {
    pub fn n_failed(&self) -> usize {
        self.candidates.iter().filter(|c| c.error.is_some()).count()
    }
}

fn cross_validate(
    params: &HyperParams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splits: &[CVSplit],
    scoring: Scoring,
    seed: u64,
) -> Result<CVResults> {
    let mut scores = Vec::with_capacity(splits.len());
    for split in splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut model = params.build(seed);
        model.fit(&x_train, &y_train)?;
        let preds = model.predict(&x_test)?;
        let score = scoring.score(&y_test, &preds);
        if !score.is_finite() {
            return Err(ValuationError::ComputationError(format!(
                "non-finite {} on fold {}",
                scoring, split.fold_idx
            )));
        }
        scores.push(score);
    }
    Ok(CVResults::from_scores(scores))
}

fn run_search(
    candidates: Vec<HyperParams>,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv_folds: usize,
    scoring: Scoring,
    seed: u64,
) -> Result<SearchResult> {
    if candidates.is_empty() {
        return Err(ValuationError::SearchError("no candidates to evaluate".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(ValuationError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    let splits = CrossValidator::new(cv_folds).with_random_state(seed).split(x.nrows())?;

    let results: Vec<CandidateResult> = candidates
        .into_par_iter()
        .map(|params| match cross_validate(&params, x, y, &splits, scoring, seed) {
            Ok(cv) => {
                debug!("{:?}: mean {} = {:.4} (+/- {:.4})", params, scoring, cv.mean_score, cv.std_score);
                CandidateResult {
                    params,
                    cv: Some(cv),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Candidate {:?} failed: {}", params, e);
                CandidateResult {
                    params,
                    cv: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    let mut best: Option<(usize, f64, f64)> = None;
    for (i, c) in results.iter().enumerate() {
        if let Some(cv) = &c.cv {
            if best.map_or(true, |(_, score, _)| cv.mean_score > score) {
                best = Some((i, cv.mean_score, cv.std_score));
            }
        }
    }

    let (best_idx, best_score, best_std) = best.ok_or_else(|| {
        ValuationError::SearchError(format!("all {} candidates failed", results.len()))
    })?;

    Ok(SearchResult {
        best_params: results[best_idx].params,
        best_score,
        best_std,
        candidates: results,
    })
}

/// Exhaustive search over an explicit candidate list
#[derive(Debug, Clone)]
pub struct GridSearch {
    candidates: Vec<HyperParams>,
    cv_folds: usize,
    scoring: Scoring,
    seed: u64,
}

impl GridSearch {
    pub fn new(candidates: Vec<HyperParams>, cv_folds: usize) -> Self {
        Self {
            candidates,
            cv_folds,
            scoring: Scoring::R2,
            seed: 42,
        }
    }

    /// Grid over the ridge penalty
    pub fn ridge(alphas: &[f64], cv_folds: usize) -> Self {
        Self::new(alphas.iter().map(|&alpha| HyperParams::Ridge { alpha }).collect(), cv_folds)
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        info!("Grid search: {} candidates x {} folds", self.candidates.len(), self.cv_folds);
        run_search(self.candidates.clone(), x, y, self.cv_folds, self.scoring, self.seed)
    }
}

/// A space candidates can be drawn from
pub trait ParamSpace: Send + Sync {
    fn sample(&self, rng: &mut ChaCha8Rng) -> Result<HyperParams>;

    /// Number of distinct points
    fn size(&self) -> usize;
}

fn pick<T: Copy>(values: &[T], name: &str, rng: &mut ChaCha8Rng) -> Result<T> {
    values
        .choose(rng)
        .copied()
        .ok_or_else(|| ValuationError::SearchError(format!("empty distribution for {}", name)))
}

impl ParamSpace for ForestSpace {
    fn sample(&self, rng: &mut ChaCha8Rng) -> Result<HyperParams> {
        Ok(HyperParams::RandomForest(ForestParams {
            n_estimators: pick(&self.n_estimators, "n_estimators", rng)?,
            max_depth: pick(&self.max_depth, "max_depth", rng)?,
            min_samples_split: pick(&self.min_samples_split, "min_samples_split", rng)?,
            min_samples_leaf: pick(&self.min_samples_leaf, "min_samples_leaf", rng)?,
            max_features: pick(&self.max_features, "max_features", rng)?,
        }))
    }

    fn size(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.min_samples_leaf.len()
            * self.max_features.len()
    }
}

impl ParamSpace for BoostingSpace {
    fn sample(&self, rng: &mut ChaCha8Rng) -> Result<HyperParams> {
        Ok(HyperParams::LightGbm(BoostingParams {
            n_estimators: pick(&self.n_estimators, "n_estimators", rng)?,
            learning_rate: pick(&self.learning_rate, "learning_rate", rng)?,
            max_leaves: pick(&self.max_leaves, "max_leaves", rng)?,
            max_depth: pick(&self.max_depth, "max_depth", rng)?,
            min_child_samples: pick(&self.min_child_samples, "min_child_samples", rng)?,
            subsample: pick(&self.subsample, "subsample", rng)?,
            colsample_bytree: pick(&self.colsample_bytree, "colsample_bytree", rng)?,
            reg_lambda: pick(&self.reg_lambda, "reg_lambda", rng)?,
            reg_alpha: pick(&self.reg_alpha, "reg_alpha", rng)?,
            goss: self.goss,
        }))
    }

    fn size(&self) -> usize {
        self.n_estimators.len()
            * self.learning_rate.len()
            * self.max_leaves.len()
            * self.max_depth.len()
            * self.min_child_samples.len()
            * self.subsample.len()
            * self.colsample_bytree.len()
            * self.reg_lambda.len()
            * self.reg_alpha.len()
    }
}

/// Seeded random sampling of `n_iter` distinct configurations
pub struct RandomizedSearch<'a> {
    space: &'a dyn ParamSpace,
    n_iter: usize,
    cv_folds: usize,
    scoring: Scoring,
    seed: u64,
}

impl<'a> RandomizedSearch<'a> {
    pub fn new(space: &'a dyn ParamSpace, n_iter: usize, cv_folds: usize) -> Self {
        Self {
            space,
            n_iter,
            cv_folds,
            scoring: Scoring::R2,
            seed: 42,
        }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Draw candidates without repeats; fewer than `n_iter` when the space is smaller
    pub fn candidates(&self) -> Result<Vec<HyperParams>> {
        if self.n_iter == 0 {
            return Err(ValuationError::invalid_param("n_iter", 0, "must be at least 1"));
        }
        let target = self.n_iter.min(self.space.size());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(target);
        let max_draws = target * 50 + 100;
        for _ in 0..max_draws {
            if out.len() >= target {
                break;
            }
            let params = self.space.sample(&mut rng)?;
            if seen.insert(format!("{:?}", params)) {
                out.push(params);
            }
        }
        Ok(out)
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        let candidates = self.candidates()?;
        info!("Randomized search: {} candidates x {} folds", candidates.len(), self.cv_folds);
        run_search(candidates, x, y, self.cv_folds, self.scoring, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::random_forest::MaxFeatures;

    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 5) as f64 });
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0) + x.column(1).mapv(|v| 0.5 * v);
        (x, y)
    }

    fn small_forest_space() -> ForestSpace {
        ForestSpace {
            n_estimators: vec![5, 10],
            max_depth: vec![Some(3), None],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1, 2],
            max_features: vec![MaxFeatures::All],
        }
    }

    #[test]
    fn test_grid_search_prefers_small_alpha_on_clean_data() {
        let (x, y) = linear_data();
        let result = GridSearch::ridge(&[1e6, 0.01, 100.0], 5).fit(&x, &y).unwrap();
        assert_eq!(result.best_params, HyperParams::Ridge { alpha: 0.01 });
        assert_eq!(result.candidates.len(), 3);
        assert!(result.best_score > 0.99);
    }

    #[test]
    fn test_ties_keep_earlier_candidate() {
        let (x, y) = linear_data();
        let result = GridSearch::ridge(&[0.5, 0.5], 3).fit(&x, &y).unwrap();
        let first = result.candidates[0].cv.as_ref().unwrap().mean_score;
        assert_eq!(result.best_score, first);
    }

    #[test]
    fn test_failed_candidates_are_skipped() {
        let (x, y) = linear_data();
        let result = GridSearch::ridge(&[-1.0, 1.0], 3).fit(&x, &y).unwrap();
        assert_eq!(result.n_failed(), 1);
        assert_eq!(result.best_params, HyperParams::Ridge { alpha: 1.0 });
    }

    #[test]
    fn test_all_failed_is_search_error() {
        let (x, y) = linear_data();
        let err = GridSearch::ridge(&[-1.0, -2.0], 3).fit(&x, &y).unwrap_err();
        assert!(matches!(err, ValuationError::SearchError(_)));
        let err = GridSearch::ridge(&[], 3).fit(&x, &y).unwrap_err();
        assert!(matches!(err, ValuationError::SearchError(_)));
    }

    #[test]
    fn test_randomized_candidates_are_distinct_and_seeded() {
        let space = small_forest_space();
        let a = RandomizedSearch::new(&space, 5, 3).with_seed(9).candidates().unwrap();
        let b = RandomizedSearch::new(&space, 5, 3).with_seed(9).candidates().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        let unique: HashSet<String> = a.iter().map(|p| format!("{:?}", p)).collect();
        assert_eq!(unique.len(), 5);

        let all = RandomizedSearch::new(&space, 100, 3).candidates().unwrap();
        assert_eq!(all.len(), space.size());
    }

    #[test]
    fn test_randomized_search_is_deterministic() {
        let (x, y) = linear_data();
        let space = small_forest_space();
        let a = RandomizedSearch::new(&space, 3, 3).with_seed(1).fit(&x, &y).unwrap();
        let b = RandomizedSearch::new(&space, 3, 3).with_seed(1).fit(&x, &y).unwrap();
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_score, b.best_score);
    }

    #[test]
    fn test_empty_distribution() {
        let mut space = small_forest_space();
        space.max_depth.clear();
        assert_eq!(space.size(), 0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(space.sample(&mut rng).is_err());
    }
}
