//! Error types for the valuation pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ValuationError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature error: {0}")]
    FeatureError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl ValuationError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_param(name: &str, value: impl ToString, reason: &str) -> Self {
        ValuationError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for ValuationError {
    fn from(err: polars::error::PolarsError) -> Self {
        ValuationError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(err: serde_json::Error) -> Self {
        ValuationError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ValuationError {
    fn from(err: ndarray::ShapeError) -> Self {
        ValuationError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
