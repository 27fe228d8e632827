//! Model training module
//!
//! Provides the three regressor families and their hyperparameter searches:
//! - Ridge regression (grid search over the penalty)
//! - Random Forest (randomized search)
//! - LightGBM-style leaf-wise gradient boosting (randomized search)

mod config;
mod models;
mod trainer;
pub mod cross_validation;
pub mod decision_tree;
pub mod lightgbm;
pub mod linear_models;
pub mod random_forest;
pub mod search;

pub use config::{BoostingSpace, ForestSpace, ModelFamily, RidgeSpace, Scoring, TrainingConfig};
pub use cross_validation::{CVResults, CVSplit, CrossValidator};
pub use decision_tree::{DecisionTree, TreeNode};
pub use lightgbm::{Boosting, LightGBMConfig, LightGBMRegressor};
pub use linear_models::RidgeRegression;
pub use models::{BoostingParams, ForestParams, HyperParams, ModelKind, Regressor, TrainedModel};
pub use random_forest::{MaxFeatures, RandomForest};
pub use search::{CandidateResult, GridSearch, ParamSpace, RandomizedSearch, SearchResult};
pub use trainer::ModelTrainer;
