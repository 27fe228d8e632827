//! Global importance from local attributions

use super::local_explanations::LocalExplanation;
use crate::error::{Result, ValuationError};
use serde::{Deserialize, Serialize};

/// Importance of one feature across explained rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_index: usize,
    pub feature_name: String,
    /// Mean absolute contribution
    pub mean_abs_contribution: f64,
    /// Mean signed contribution
    pub mean_contribution: f64,
}

/// Features ranked by mean absolute contribution, descending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceResult {
    pub n_rows: usize,
    pub ranking: Vec<FeatureImportance>,
}

impl ImportanceResult {
    pub fn top_k(&self, k: usize) -> &[FeatureImportance] {
        &self.ranking[..k.min(self.ranking.len())]
    }

    /// Features whose mean absolute contribution exceeds `threshold`
    pub fn above_threshold(&self, threshold: f64) -> Vec<&FeatureImportance> {
        self.ranking
            .iter()
            .filter(|f| f.mean_abs_contribution > threshold)
            .collect()
    }
}

/// Rank features by mean |contribution| over `explanations`
pub fn global_importance(explanations: &[LocalExplanation]) -> Result<ImportanceResult> {
    let first = explanations
        .first()
        .ok_or_else(|| ValuationError::EvaluationError("no explanations to aggregate".to_string()))?;
    let n_features = first.contributions.len();

    let mut abs_sum = vec![0.0; n_features];
    let mut sum = vec![0.0; n_features];
    for e in explanations {
        if e.contributions.len() != n_features {
            return Err(ValuationError::ShapeError {
                expected: format!("{} contributions", n_features),
                actual: format!("{} contributions", e.contributions.len()),
            });
        }
        for c in &e.contributions {
            abs_sum[c.feature_index] += c.contribution.abs();
            sum[c.feature_index] += c.contribution;
        }
    }

    let n = explanations.len() as f64;
    let mut ranking: Vec<FeatureImportance> = first
        .contributions
        .iter()
        .map(|c| FeatureImportance {
            feature_index: c.feature_index,
            feature_name: c.feature_name.clone(),
            mean_abs_contribution: abs_sum[c.feature_index] / n,
            mean_contribution: sum[c.feature_index] / n,
        })
        .collect();
    // Stable sort keeps column order among equal importances
    ranking.sort_by(|a, b| {
        b.mean_abs_contribution
            .partial_cmp(&a.mean_abs_contribution)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(ImportanceResult {
        n_rows: explanations.len(),
        ranking,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explainability::FeatureContribution;

    fn explanation(values: &[f64]) -> LocalExplanation {
        LocalExplanation {
            instance_index: 0,
            base_value: 0.0,
            prediction: values.iter().sum(),
            contributions: values
                .iter()
                .enumerate()
                .map(|(i, &c)| FeatureContribution {
                    feature_index: i,
                    feature_name: format!("f{}", i),
                    feature_value: 0.0,
                    contribution: c,
                })
                .collect(),
        }
    }

    #[test]
    fn test_ranking() {
        let result = global_importance(&[explanation(&[1.0, -4.0, 0.0]), explanation(&[-1.0, 2.0, 0.0])]).unwrap();
        let names: Vec<&str> = result.ranking.iter().map(|f| f.feature_name.as_str()).collect();
        assert_eq!(names, vec!["f1", "f0", "f2"]);
        assert_eq!(result.ranking[0].mean_abs_contribution, 3.0);
        assert_eq!(result.ranking[0].mean_contribution, -1.0);
        assert_eq!(result.ranking[1].mean_contribution, 0.0);
        assert_eq!(result.top_k(2).len(), 2);
        assert_eq!(result.above_threshold(0.5).len(), 2);
    }

    #[test]
    fn test_empty_and_ragged() {
        assert!(global_importance(&[]).is_err());
        assert!(global_importance(&[explanation(&[1.0]), explanation(&[1.0, 2.0])]).is_err());
    }
}
