//! Data loading and split configuration

use super::record::TARGET_COLUMN;
use serde::{Deserialize, Serialize};

/// How to read the raw dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Target column name
    pub target_column: String,

    /// Field delimiter
    pub delimiter: char,

    /// Columns never used as features (ids, free-text codes)
    pub drop_columns: Vec<String>,

    /// Rows scanned for schema inference
    pub infer_schema_rows: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            target_column: TARGET_COLUMN.to_string(),
            delimiter: ',',
            drop_columns: vec!["parcelid".to_string(), "propertyzoningdesc".to_string()],
            infer_schema_rows: 10_000,
        }
    }
}

impl DataConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = target.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_drop_column(mut self, column: impl Into<String>) -> Self {
        self.drop_columns.push(column.into());
        self
    }
}

/// Train/test partition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows held out for testing, in (0, 1)
    pub test_ratio: f64,

    /// Shuffle seed
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(test_ratio: f64, seed: u64) -> Self {
        Self { test_ratio, seed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DataConfig::default();
        assert_eq!(config.target_column, "taxvaluedollarcnt");
        assert!(config.drop_columns.contains(&"propertyzoningdesc".to_string()));
        let split = SplitConfig::default();
        assert_eq!(split.test_ratio, 0.2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DataConfig = serde_json::from_str(r#"{"delimiter": "\t"}"#).unwrap();
        assert_eq!(config.delimiter, '\t');
        assert_eq!(config.target_column, "taxvaluedollarcnt");
    }
}
