//! K-fold cross-validation

use crate::error::{Result, ValuationError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single train/test fold
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Shuffled K-fold splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    n_splits: usize,
    shuffle: bool,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: true,
            random_state: 42,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Partition `0..n_samples` into folds; every index lands in exactly one test fold
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(ValuationError::invalid_param("cv_folds", n_splits, "must be at least 2"));
        }
        if n_samples < n_splits {
            return Err(ValuationError::DataError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();
            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }
        Ok(splits)
    }
}

/// Per-fold scores of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

impl CVResults {
    pub fn from_scores(fold_scores: Vec<f64>) -> Self {
        let n = fold_scores.len().max(1) as f64;
        let mean_score = fold_scores.iter().sum::<f64>() / n;
        let variance = fold_scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;
        Self {
            fold_scores,
            mean_score,
            std_score: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_partition_indices() {
        let splits = CrossValidator::new(3).split(10).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(
            splits.iter().map(|s| s.test_indices.len()).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );

        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        for s in &splits {
            assert_eq!(s.train_indices.len() + s.test_indices.len(), 10);
            assert!(s.test_indices.iter().all(|i| !s.train_indices.contains(i)));
        }
    }

    #[test]
    fn test_seeded_folds_repeat() {
        let a = CrossValidator::new(5).with_random_state(1).split(50).unwrap();
        let b = CrossValidator::new(5).with_random_state(1).split(50).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_folds() {
        assert!(CrossValidator::new(1).split(10).is_err());
        assert!(CrossValidator::new(5).split(3).is_err());
    }

    #[test]
    fn test_cv_results() {
        let r = CVResults::from_scores(vec![0.5, 0.7]);
        assert!((r.mean_score - 0.6).abs() < 1e-12);
        assert!((r.std_score - 0.1).abs() < 1e-12);
    }
}
