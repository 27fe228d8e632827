//! Train/test partitioning

use super::config::SplitConfig;
use crate::error::{Result, ValuationError};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Disjoint index partition of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    /// Select train and test rows of a matrix/target pair
    pub fn take(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> (Array2<f64>, Array2<f64>, Array1<f64>, Array1<f64>) {
        (
            x.select(Axis(0), &self.train),
            x.select(Axis(0), &self.test),
            y.select(Axis(0), &self.train),
            y.select(Axis(0), &self.test),
        )
    }
}

/// Shuffle `0..n_rows` with a seeded RNG and hold out `test_ratio` of it.
///
/// The test side gets `round(n_rows * test_ratio)` rows, clamped so that
/// neither side is empty.
pub fn train_test_split(n_rows: usize, config: &SplitConfig) -> Result<Split> {
    if !(config.test_ratio > 0.0 && config.test_ratio < 1.0) {
        return Err(ValuationError::invalid_param(
            "test_ratio",
            config.test_ratio,
            "must be in (0, 1)",
        ));
    }
    if n_rows < 2 {
        return Err(ValuationError::DataError(format!(
            "need at least 2 rows to split, got {}",
            n_rows
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let n_test = ((n_rows as f64 * config.test_ratio).round() as usize).clamp(1, n_rows - 1);
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();

    debug!("Split {} rows into {} train / {} test", n_rows, train.len(), test.len());
    Ok(Split { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let split = train_test_split(1000, &SplitConfig::new(0.2, 7)).unwrap();
        assert_eq!(split.test.len(), 200);
        assert_eq!(split.train.len(), 800);

        let mut seen = vec![0usize; 1000];
        for &i in split.train.iter().chain(split.test.iter()) {
            seen[i] += 1;
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_split_is_seeded() {
        let a = train_test_split(100, &SplitConfig::new(0.3, 11)).unwrap();
        let b = train_test_split(100, &SplitConfig::new(0.3, 11)).unwrap();
        let c = train_test_split(100, &SplitConfig::new(0.3, 12)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tiny_split_keeps_both_sides() {
        let split = train_test_split(2, &SplitConfig::new(0.01, 0)).unwrap();
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 1);
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(train_test_split(10, &SplitConfig::new(0.0, 0)).is_err());
        assert!(train_test_split(10, &SplitConfig::new(1.0, 0)).is_err());
        assert!(train_test_split(1, &SplitConfig::new(0.5, 0)).is_err());
    }

    #[test]
    fn test_take() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![10.0, 20.0, 30.0, 40.0];
        let split = Split { train: vec![0, 2], test: vec![3, 1] };
        let (x_tr, x_te, y_tr, y_te) = split.take(&x, &y);
        assert_eq!(x_tr, array![[1.0], [3.0]]);
        assert_eq!(x_te, array![[4.0], [2.0]]);
        assert_eq!(y_tr, array![10.0, 30.0]);
        assert_eq!(y_te, array![40.0, 20.0]);
    }
}
