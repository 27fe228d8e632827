//! Feature construction
//!
//! Cleans raw [`Record`](crate::data::Record)s, derives the domain ratios and
//! flags, and encodes the categorical location and land-use fields into a
//! purely numeric matrix. Every learned statistic comes from the rows passed
//! to [`FeatureBuilder::fit`].

mod builder;
mod config;
pub mod encoder;
pub mod engineered;

pub use builder::{FeatureBuilder, FeatureMatrix, TransformStats};
pub use config::{FeatureConfig, TopKSpec};
pub use encoder::{CategoryEncoder, EncoderType, OTHER_BUCKET};
pub use engineered::{safe_ratio, ENGINEERED_COLUMNS};
