//! Slow-slip detection from seismic correlation series.
//!
//! Per station and day, the windowed correlation between a high-frequency
//! envelope and a low-frequency signal is smoothed, compared against
//! adaptive noise thresholds, and segmented into detection events; a
//! rolling multi-day exceedance trend summarises activity over time.
//! [`pipeline::run_network`] drives all stages for a set of stations.

pub mod analysis;
pub mod config;
pub mod detection;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod stations;
pub mod stats;
pub mod synthetic;

pub use model::{Result, SseError};
