//! Sign resolution.
//!
//! Whether slow-slip activity shows up as positive or negative correlation
//! depends on the station. The decision is made once per station: if the
//! smoothed series spends more samples below its negative threshold than
//! above its positive one, the station's sign convention is inverted so that
//! events are always positive excursions downstream.
//!
//! Inversion never touches the input. [`resolve`] returns new series and
//! thresholds with the two sides swapped.

use serde::{Deserialize, Serialize};

use crate::detection::thresholds::DailyThreshold;
use crate::model::{Direction, SmoothedSeries};

/// Outcome of the sign vote, kept for the station summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignDecision {
    pub inverted: bool,
    /// Samples above their day's positive threshold, before inversion.
    pub above: usize,
    /// Samples below their day's negative threshold, before inversion.
    pub below: usize,
}

/// Counts threshold exceedances on both sides. `series` and `history` are
/// matched day by day.
pub fn decide_sign(series: &[SmoothedSeries], history: &[DailyThreshold]) -> SignDecision {
    let mut above = 0;
    let mut below = 0;
    for (day, threshold) in series.iter().zip(history) {
        for v in day.valid_values() {
            if threshold.thresholds.exceeded_by(v, Direction::Positive) {
                above += 1;
            } else if threshold.thresholds.exceeded_by(v, Direction::Negative) {
                below += 1;
            }
        }
    }
    SignDecision {
        inverted: above < below,
        above,
        below,
    }
}

/// A station timeline in its resolved sign convention.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTimeline {
    pub series: Vec<SmoothedSeries>,
    pub history: Vec<DailyThreshold>,
    pub decision: SignDecision,
}

/// Decides the sign and applies it.
pub fn resolve(series: &[SmoothedSeries], history: &[DailyThreshold]) -> ResolvedTimeline {
    let decision = decide_sign(series, history);
    apply(series, history, decision)
}

/// Applies a recorded decision.
pub fn apply(
    series: &[SmoothedSeries],
    history: &[DailyThreshold],
    decision: SignDecision,
) -> ResolvedTimeline {
    if !decision.inverted {
        return ResolvedTimeline {
            series: series.to_vec(),
            history: history.to_vec(),
            decision,
        };
    }
    ResolvedTimeline {
        series: series.iter().map(SmoothedSeries::negated).collect(),
        history: history.iter().map(|h| h.swapped()).collect(),
        decision,
    }
}
