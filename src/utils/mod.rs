//! Utility types

mod timer;

pub use timer::{StageTiming, Timer};
