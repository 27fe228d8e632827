//! Feature engineering configuration

use crate::data::CategoricalField;
use serde::{Deserialize, Serialize};

/// Top-K encoding request for one categorical field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopKSpec {
    pub field: CategoricalField,
    pub k: usize,
}

impl TopKSpec {
    pub fn new(field: CategoricalField, k: usize) -> Self {
        Self { field, k }
    }
}

/// Configuration for the feature builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Year used to compute `age_of_home`
    pub reference_year: i32,

    /// Value emitted by a ratio whose denominator is zero or missing
    pub ratio_sentinel: f64,

    /// High-cardinality fields collapsed to their K most frequent values
    pub top_k: Vec<TopKSpec>,

    /// Low-cardinality fields expanded with one indicator per level
    pub one_hot: Vec<CategoricalField>,

    /// Drop the reference level of every encoded field
    pub drop_first: bool,

    /// Keep numeric columns the builder does not know by name
    pub include_extras: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            reference_year: 2025,
            ratio_sentinel: 0.0,
            top_k: vec![
                TopKSpec::new(CategoricalField::City, 50),
                TopKSpec::new(CategoricalField::Zip, 50),
                TopKSpec::new(CategoricalField::Neighborhood, 50),
                TopKSpec::new(CategoricalField::LandUseCode, 15),
                TopKSpec::new(CategoricalField::LandUseType, 5),
            ],
            one_hot: vec![
                CategoricalField::AirConditioning,
                CategoricalField::Heating,
                CategoricalField::Fips,
                CategoricalField::County,
            ],
            drop_first: true,
            include_extras: true,
        }
    }
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn with_top_k(mut self, field: CategoricalField, k: usize) -> Self {
        self.top_k.retain(|spec| spec.field != field);
        self.top_k.push(TopKSpec::new(field, k));
        self
    }

    pub fn with_drop_first(mut self, drop_first: bool) -> Self {
        self.drop_first = drop_first;
        self
    }

    pub fn with_extras(mut self, include: bool) -> Self {
        self.include_extras = include;
        self
    }
}
