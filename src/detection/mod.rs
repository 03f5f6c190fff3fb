//! Detection on smoothed correlation series.
//!
//! Stages run per station in this order, each strictly chronological:
//! thresholds, sign resolution, then segmentation and rolling aggregation
//! over the resolved timeline.

pub mod polarity;
pub mod rolling;
pub mod segmentation;
pub mod thresholds;

pub use polarity::{ResolvedTimeline, SignDecision};
pub use rolling::{combine_bands, RollingExceedance, RollingTrends, TrendSeries};
pub use segmentation::{screen_events, segment, segment_all};
pub use thresholds::{combine_thresholds, global_std, DailyThreshold, StdSource};
