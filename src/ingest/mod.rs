//! Retrieval of station days from the upstream preprocessing stages.

pub mod quality;
pub mod source;
pub mod validation;

pub use quality::{QualityLabel, QualityLabels};
pub use source::{fetch_day, InMemorySource, QualitySource, SignalSource, StationDay};
