//! Categorical encoding: one-hot and top-K

use crate::data::CategoricalField;
use crate::error::{Result, ValuationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Catch-all level for categories outside the top K
pub const OTHER_BUCKET: &str = "other";

/// Encoding strategy for one field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EncoderType {
    /// One indicator per observed level; missing or unseen values encode as all zeros
    OneHot,
    /// Indicators for the K most frequent levels plus an `other` bucket that
    /// absorbs rare, missing and unseen values
    TopK { k: usize },
}

/// Fitted indicator encoder for a single categorical field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEncoder {
    field: CategoricalField,
    encoder_type: EncoderType,
    drop_first: bool,
    /// All levels in output order; the first is the reference level
    levels: Vec<String>,
    index: HashMap<String, usize>,
    is_fitted: bool,
}

impl CategoryEncoder {
    pub fn new(field: CategoricalField, encoder_type: EncoderType, drop_first: bool) -> Self {
        Self {
            field,
            encoder_type,
            drop_first,
            levels: Vec::new(),
            index: HashMap::new(),
            is_fitted: false,
        }
    }

    pub fn field(&self) -> CategoricalField {
        self.field
    }

    /// Learn the level vocabulary from observed values
    pub fn fit<'a, I>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in values.into_iter().flatten() {
            *counts.entry(v).or_insert(0) += 1;
        }

        self.levels = match self.encoder_type {
            EncoderType::OneHot => {
                let mut levels: Vec<String> = counts.keys().map(|s| s.to_string()).collect();
                levels.sort();
                levels
            }
            EncoderType::TopK { k } => {
                if k == 0 {
                    return Err(ValuationError::invalid_param(
                        "k",
                        k,
                        "top-K encoding needs k >= 1",
                    ));
                }
                // Frequency descending, ties by key so the vocabulary is deterministic
                let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                let mut top: Vec<String> = ranked.into_iter().take(k).map(|(s, _)| s.to_string()).collect();
                top.sort();
                let mut levels = vec![OTHER_BUCKET.to_string()];
                levels.extend(top);
                levels
            }
        };

        self.index = self
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| (level.clone(), i))
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    fn first_output(&self) -> usize {
        if self.drop_first && !self.levels.is_empty() {
            1
        } else {
            0
        }
    }

    /// Number of indicator columns produced
    pub fn n_outputs(&self) -> usize {
        self.levels.len() - self.first_output()
    }

    /// Output column names, e.g. `regionidzip_top_96987` or `fips_6037`
    pub fn output_names(&self) -> Vec<String> {
        let prefix = match self.encoder_type {
            EncoderType::OneHot => self.field.column_name().to_string(),
            EncoderType::TopK { .. } => format!("{}_top", self.field.column_name()),
        };
        self.levels[self.first_output()..]
            .iter()
            .map(|level| format!("{}_{}", prefix, level))
            .collect()
    }

    /// Level index a value maps to, if any
    fn level_of(&self, value: Option<&str>) -> Option<usize> {
        let hit = value.and_then(|v| self.index.get(v).copied());
        match self.encoder_type {
            EncoderType::OneHot => hit,
            EncoderType::TopK { .. } => Some(hit.unwrap_or(0)),
        }
    }

    /// Write indicator values for `value` into `out` (length `n_outputs()`)
    pub fn encode_into(&self, value: Option<&str>, out: &mut [f64]) -> Result<()> {
        if !self.is_fitted {
            return Err(ValuationError::ModelNotFitted);
        }
        if out.len() != self.n_outputs() {
            return Err(ValuationError::ShapeError {
                expected: format!("{} outputs", self.n_outputs()),
                actual: format!("{} outputs", out.len()),
            });
        }
        out.iter_mut().for_each(|v| *v = 0.0);
        if let Some(level) = self.level_of(value) {
            let offset = self.first_output();
            if level >= offset {
                out[level - offset] = 1.0;
            }
        }
        Ok(())
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }
}
