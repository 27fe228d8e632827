//! Home valuation - tuned regression models of assessed property value
//!
//! This crate turns a raw property-record table into trained, evaluated and
//! explained models:
//! - Loading records and a seeded train/test split
//! - Feature engineering: imputation, domain ratios, top-K and one-hot encoding
//! - Ridge, Random Forest and LightGBM-style boosting with hyperparameter search
//! - Held-out evaluation and exact TreeSHAP attributions
//!
//! # Modules
//!
//! - [`data`] - Record loading and train/test splitting
//! - [`features`] - Feature builder and categorical encoders
//! - [`training`] - Estimators, cross-validation and search
//! - [`evaluation`] - Regression metrics on the test partition
//! - [`explainability`] - SHAP explainers and global importance
//! - [`pipeline`] - Stage orchestration and model artifacts
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Pipeline stages
pub mod data;
pub mod features;
pub mod training;
pub mod evaluation;
pub mod explainability;

// Orchestration
pub mod config;
pub mod pipeline;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{Result, ValuationError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, ValuationError};

    // Data
    pub use crate::data::{load_records, train_test_split, DataConfig, Record, RecordSet, SplitConfig};

    // Features
    pub use crate::features::{FeatureBuilder, FeatureConfig, FeatureMatrix, TransformStats};

    // Training
    pub use crate::training::{ModelFamily, ModelTrainer, Regressor, TrainedModel, TrainingConfig};

    // Evaluation
    pub use crate::evaluation::{evaluate, EvaluationConfig, EvaluationReport};

    // Explainability
    pub use crate::explainability::{explainer_for, global_importance, LocalExplanation, ShapExplainer};

    // Pipeline
    pub use crate::config::{ExplainConfig, PipelineConfig};
    pub use crate::pipeline::{ModelArtifact, Pipeline, PipelineOutput};
}
