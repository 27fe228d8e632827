//! Model explainability module
//!
//! Provides SHAP attributions for every trained family:
//! - Exact path-dependent TreeSHAP for the forest and boosted ensembles
//! - Closed-form linear SHAP for ridge regression
//! - Global importance ranking by mean absolute contribution

mod explainer;
mod importance;
mod local_explanations;
pub mod tree_shap;

pub use explainer::{explainer_for, LinearExplainer, ShapExplainer, TreeExplainer};
pub use importance::{global_importance, FeatureImportance, ImportanceResult};
pub use local_explanations::{FeatureContribution, LocalExplanation};
