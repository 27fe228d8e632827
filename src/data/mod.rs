//! Raw dataset handling
//!
//! Loading of the property table into immutable [`Record`]s and the seeded
//! train/test splitter.

mod config;
pub mod loader;
pub mod record;
pub mod split;

pub use config::{DataConfig, SplitConfig};
pub use loader::{load_dataframe, load_records, records_from_dataframe};
pub use record::{CategoricalField, NumericField, Record, RecordSet, RecordSummary, TARGET_COLUMN};
pub use split::{train_test_split, Split};
