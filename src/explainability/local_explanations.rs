//! Local explanations (per-row feature contributions)

use serde::{Deserialize, Serialize};

/// Feature contribution to a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature_index: usize,
    pub feature_name: String,
    /// Feature value for this instance
    pub feature_value: f64,
    /// Contribution to prediction (SHAP value)
    pub contribution: f64,
}

/// Local explanation for a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalExplanation {
    pub instance_index: usize,
    /// Expected prediction over the training data
    pub base_value: f64,
    pub prediction: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl LocalExplanation {
    /// Sum of contributions
    pub fn sum_contributions(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    /// `prediction - (base_value + sum of contributions)`
    pub fn additivity_gap(&self) -> f64 {
        self.prediction - self.base_value - self.sum_contributions()
    }

    /// Contributions sorted by absolute value, descending
    pub fn sorted_contributions(&self) -> Vec<&FeatureContribution> {
        let mut sorted: Vec<&FeatureContribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    pub fn top_k_contributors(&self, k: usize) -> Vec<&FeatureContribution> {
        self.sorted_contributions().into_iter().take(k).collect()
    }

    pub fn positive_contributors(&self) -> Vec<&FeatureContribution> {
        self.contributions.iter().filter(|c| c.contribution > 0.0).collect()
    }

    pub fn negative_contributors(&self) -> Vec<&FeatureContribution> {
        self.contributions.iter().filter(|c| c.contribution < 0.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explanation() -> LocalExplanation {
        let contributions = [("sqft", 500.0, 40_000.0), ("age", 60.0, -15_000.0), ("beds", 3.0, 2_000.0)]
            .iter()
            .enumerate()
            .map(|(i, (name, value, c))| FeatureContribution {
                feature_index: i,
                feature_name: name.to_string(),
                feature_value: *value,
                contribution: *c,
            })
            .collect();
        LocalExplanation {
            instance_index: 0,
            base_value: 400_000.0,
            prediction: 427_000.0,
            contributions,
        }
    }

    #[test]
    fn test_sorted_contributions() {
        let e = explanation();
        let sorted = e.sorted_contributions();
        assert_eq!(sorted[0].feature_name, "sqft");
        assert_eq!(sorted[1].feature_name, "age");
        assert_eq!(e.top_k_contributors(1).len(), 1);
        assert_eq!(e.top_k_contributors(10).len(), 3);
    }

    #[test]
    fn test_sign_filters_and_additivity() {
        let e = explanation();
        assert_eq!(e.positive_contributors().len(), 2);
        assert_eq!(e.negative_contributors().len(), 1);
        assert_eq!(e.sum_contributions(), 27_000.0);
        assert_eq!(e.additivity_gap(), 0.0);
    }
}
