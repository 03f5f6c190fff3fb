//! Adaptive threshold estimation.
//!
//! Noise scales come from mirrored standard deviations of the smoothed
//! series, computed separately for the negative and positive tails:
//!
//! - the **global** estimate uses every valid smoothed value of the station;
//! - the **local** estimate for a day uses the days within `par_days` of it,
//!   provided the window holds at least `min_days_required` days and at least
//!   `min_coverage_ratio` of its samples are valid.
//!
//! Days whose local estimate fails a gate are filled from the nearest earlier
//! day with an estimate, then from the nearest later one, and finally from
//! the global estimate. Every resolved scale is capped at `std_cap`.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::analysis::smoothing::SmoothedPopulation;
use crate::config::ThresholdConfig;
use crate::model::{SmoothedSeries, StdPair, ThresholdPair};
use crate::stats::MirroredMoments;

// ---------------------------------------------------------------------------
// Per-day moments
// ---------------------------------------------------------------------------

/// Sufficient statistics of one smoothed day for the local estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayMoments {
    pub day: NaiveDate,
    pub neg: MirroredMoments,
    pub pos: MirroredMoments,
    /// Valid smoothed samples.
    pub valid: usize,
    /// All smoothed samples, valid or not.
    pub total: usize,
}

impl DayMoments {
    pub fn from_series(series: &SmoothedSeries) -> Self {
        let mut neg = MirroredMoments::new();
        let mut pos = MirroredMoments::new();
        for v in series.valid_values() {
            if v < 0.0 {
                neg.push(v);
            } else if v > 0.0 {
                pos.push(v);
            }
        }
        Self {
            day: series.day,
            neg,
            pos,
            valid: neg.count() + pos.count(),
            total: series.len(),
        }
    }
}

/// Station-wide noise scales from every valid smoothed value.
pub fn global_std(series: &[SmoothedSeries], min_std: f64) -> StdPair {
    let mut population = SmoothedPopulation::new();
    series.iter().for_each(|s| population.push_series(s));
    population.finalize(min_std)
}

// ---------------------------------------------------------------------------
// Local estimate
// ---------------------------------------------------------------------------

/// Why a day's local estimate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateFailure {
    TooFewDays { present: usize, required: usize },
    LowCoverage,
    EmptyTail,
}

/// Windowed per-day estimator over one station's chronologically sorted days.
pub struct LocalStdEstimator<'a> {
    cfg: &'a ThresholdConfig,
}

impl<'a> LocalStdEstimator<'a> {
    pub fn new(cfg: &'a ThresholdConfig) -> Self {
        Self { cfg }
    }

    /// Local estimate for every day of `days`, which must be sorted by day.
    pub fn estimate(&self, days: &[DayMoments]) -> Vec<Result<StdPair, GateFailure>> {
        days.iter()
            .map(|target| {
                let span = Days::new(self.cfg.par_days.max(0) as u64);
                let from = target.day.checked_sub_days(span).unwrap_or(NaiveDate::MIN);
                let to = target.day.checked_add_days(span).unwrap_or(NaiveDate::MAX);
                let lo = days.partition_point(|d| d.day < from);
                let hi = days.partition_point(|d| d.day <= to);
                self.estimate_window(&days[lo..hi])
            })
            .collect()
    }

    fn estimate_window(&self, window: &[DayMoments]) -> Result<StdPair, GateFailure> {
        if window.len() < self.cfg.min_days_required {
            return Err(GateFailure::TooFewDays {
                present: window.len(),
                required: self.cfg.min_days_required,
            });
        }

        let mut neg = MirroredMoments::new();
        let mut pos = MirroredMoments::new();
        let (mut valid, mut total) = (0usize, 0usize);
        for day in window {
            neg.merge(&day.neg);
            pos.merge(&day.pos);
            valid += day.valid;
            total += day.total;
        }

        if total == 0 || (valid as f64 / total as f64) < self.cfg.min_coverage_ratio {
            return Err(GateFailure::LowCoverage);
        }
        match (neg.std(), pos.std()) {
            (Some(n), Some(p)) => Ok(StdPair::new(n, p)),
            _ => Err(GateFailure::EmptyTail),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Where a day's resolved noise scale came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdSource {
    Local,
    Filled,
    Global,
}

/// Fills missing estimates and caps the result.
///
/// Forward pass first, then backward, then `global`. A day is left to the
/// global estimate only when no day of the timeline has a local one.
pub fn resolve_estimates(
    estimates: &[Option<StdPair>],
    global: StdPair,
    cap: f64,
) -> Vec<(StdPair, StdSource)> {
    let mut resolved: Vec<Option<(StdPair, StdSource)>> = estimates
        .iter()
        .map(|e| e.map(|std| (std, StdSource::Local)))
        .collect();

    let mut last = None;
    for (slot, estimate) in resolved.iter_mut().zip(estimates) {
        match estimate {
            Some(std) => last = Some(*std),
            None => *slot = last.map(|std| (std, StdSource::Filled)),
        }
    }

    let mut next = None;
    for (slot, estimate) in resolved.iter_mut().zip(estimates).rev() {
        match estimate {
            Some(std) => next = Some(*std),
            None if slot.is_none() => *slot = next.map(|std| (std, StdSource::Filled)),
            None => {}
        }
    }

    resolved
        .into_iter()
        .map(|slot| {
            let (std, source) = slot.unwrap_or((global, StdSource::Global));
            (std.capped(cap), source)
        })
        .collect()
}

/// Turns noise scales into decision thresholds.
///
/// Both sides are multiplied by `n_std`. When the smaller magnitude times
/// `unify_factor` still exceeds the larger one, both take the smaller value.
/// Otherwise the larger side is replaced by the smaller times
/// `weight_for_bigger`.
pub fn combine_thresholds(std: StdPair, cfg: &ThresholdConfig) -> ThresholdPair {
    let abs_neg = cfg.n_std * std.neg;
    let abs_pos = cfg.n_std * std.pos;
    let smaller = abs_neg.min(abs_pos);
    let bigger = abs_neg.max(abs_pos);

    if smaller * cfg.unify_factor > bigger {
        return ThresholdPair {
            neg: smaller,
            pos: smaller,
        };
    }
    let replaced = (smaller * cfg.weight_for_bigger).max(0.0);
    if abs_neg > abs_pos {
        ThresholdPair {
            neg: replaced,
            pos: abs_pos,
        }
    } else {
        ThresholdPair {
            neg: abs_neg,
            pos: replaced,
        }
    }
}

// ---------------------------------------------------------------------------
// Threshold history
// ---------------------------------------------------------------------------

/// Resolved noise scale and thresholds of one station day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyThreshold {
    pub day: NaiveDate,
    pub std: StdPair,
    pub source: StdSource,
    pub thresholds: ThresholdPair,
}

impl DailyThreshold {
    /// The same day seen after a sign inversion.
    pub fn swapped(self) -> Self {
        Self {
            std: self.std.swapped(),
            thresholds: self.thresholds.swapped(),
            ..self
        }
    }
}

/// Per-day thresholds for a chronologically sorted station timeline.
///
/// Returns the history together with the gate failures of the days that did
/// not get a local estimate, for logging.
pub fn threshold_history(
    series: &[SmoothedSeries],
    global: StdPair,
    cfg: &ThresholdConfig,
) -> (Vec<DailyThreshold>, Vec<(NaiveDate, GateFailure)>) {
    let moments: Vec<DayMoments> = series.iter().map(DayMoments::from_series).collect();
    let local = LocalStdEstimator::new(cfg).estimate(&moments);

    let failures = moments
        .iter()
        .zip(&local)
        .filter_map(|(m, r)| r.err().map(|f| (m.day, f)))
        .collect();
    let estimates: Vec<Option<StdPair>> = local.into_iter().map(|r| r.ok()).collect();

    let history = resolve_estimates(&estimates, global, cfg.std_cap)
        .into_iter()
        .zip(&moments)
        .map(|((std, source), m)| DailyThreshold {
            day: m.day,
            std,
            source,
            thresholds: combine_thresholds(std, cfg),
        })
        .collect();
    (history, failures)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Duration::days(offset)
    }

    /// A smoothed day of 4 samples alternating `-neg` / `+pos`.
    fn smoothed(offset: i64, neg: f64, pos: f64) -> SmoothedSeries {
        let mut s = SmoothedSeries::absent("RIOS", day(offset), 21_600.0);
        s.samples = vec![
            Sample::Valid(-neg),
            Sample::Valid(pos),
            Sample::Valid(-neg),
            Sample::Valid(pos),
        ];
        s
    }

    fn sp(neg: f64, pos: f64) -> StdPair {
        StdPair::new(neg, pos)
    }

    // --- Local estimate ------------------------------------------------------

    #[test]
    fn test_short_timeline_fails_day_count_gate() {
        let cfg = ThresholdConfig::default();
        let moments: Vec<_> = (0..10).map(|d| DayMoments::from_series(&smoothed(d, 0.02, 0.03))).collect();
        let local = LocalStdEstimator::new(&cfg).estimate(&moments);
        assert!(local.iter().all(|r| matches!(r, Err(GateFailure::TooFewDays { present: 10, .. }))));
    }

    #[test]
    fn test_window_is_inclusive_of_par_days() {
        let cfg = ThresholdConfig {
            par_days: 2,
            min_days_required: 5,
            ..ThresholdConfig::default()
        };
        let moments: Vec<_> = (0..5).map(|d| DayMoments::from_series(&smoothed(d, 0.02, 0.03))).collect();
        let local = LocalStdEstimator::new(&cfg).estimate(&moments);
        // Only the middle day sees two days on each side.
        assert!(local[2].is_ok());
        assert!(local[1].is_err());
        let std = local[2].unwrap();
        assert!((std.neg - 0.02).abs() < 1e-12);
        assert!((std.pos - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_huge_par_days_clamps_to_timeline() {
        let cfg = ThresholdConfig {
            par_days: i64::MAX,
            min_days_required: 2,
            ..ThresholdConfig::default()
        };
        let moments: Vec<_> = (0..2).map(|d| DayMoments::from_series(&smoothed(d, 0.02, 0.03))).collect();
        let local = LocalStdEstimator::new(&cfg).estimate(&moments);
        assert!(local.iter().all(|r| r.is_ok()), "every day should see the whole timeline");
    }

    #[test]
    fn test_low_coverage_window_is_rejected() {
        let cfg = ThresholdConfig {
            par_days: 1,
            min_days_required: 1,
            ..ThresholdConfig::default()
        };
        let mut sparse = smoothed(0, 0.02, 0.03);
        sparse.samples[0] = Sample::Absent;
        sparse.samples[1] = Sample::Absent;
        sparse.samples[2] = Sample::Absent;
        let local = LocalStdEstimator::new(&cfg).estimate(&[DayMoments::from_series(&sparse)]);
        assert_eq!(local[0], Err(GateFailure::LowCoverage));
    }

    #[test]
    fn test_one_sided_window_is_missing() {
        let cfg = ThresholdConfig {
            par_days: 0,
            min_days_required: 1,
            ..ThresholdConfig::default()
        };
        let mut positive_only = smoothed(0, 0.02, 0.03);
        positive_only.samples[0] = Sample::Valid(0.01);
        positive_only.samples[2] = Sample::Valid(0.01);
        let local = LocalStdEstimator::new(&cfg).estimate(&[DayMoments::from_series(&positive_only)]);
        assert_eq!(local[0], Err(GateFailure::EmptyTail));
    }

    // --- Resolution ----------------------------------------------------------

    #[test]
    fn test_fill_forward_then_backward() {
        let estimates = [None, Some(sp(0.01, 0.02)), None, None, Some(sp(0.03, 0.04)), None];
        let resolved = resolve_estimates(&estimates, sp(0.5, 0.5), 0.1);
        let stds: Vec<StdPair> = resolved.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stds,
            vec![sp(0.01, 0.02), sp(0.01, 0.02), sp(0.01, 0.02), sp(0.01, 0.02), sp(0.03, 0.04), sp(0.03, 0.04)]
        );
        assert_eq!(resolved[0].1, StdSource::Filled);
        assert_eq!(resolved[1].1, StdSource::Local);
    }

    #[test]
    fn test_global_used_only_when_nothing_local() {
        let resolved = resolve_estimates(&[None, None], sp(0.02, 0.03), 0.1);
        assert!(resolved.iter().all(|&(s, src)| s == sp(0.02, 0.03) && src == StdSource::Global));
    }

    #[test]
    fn test_cap_applies_to_every_source() {
        let resolved = resolve_estimates(&[Some(sp(0.5, 0.05)), None], sp(0.2, 0.2), 0.1);
        assert_eq!(resolved[0].0, sp(0.1, 0.05));
        assert_eq!(resolved[1].0, sp(0.1, 0.05));
        let global_only = resolve_estimates(&[None], sp(0.2, 0.01), 0.1);
        assert_eq!(global_only[0].0, sp(0.1, 0.01));
    }

    // --- Combination ---------------------------------------------------------

    #[test]
    fn test_close_magnitudes_unify_to_smaller() {
        let pair = combine_thresholds(sp(0.020, 0.022), &ThresholdConfig::default());
        assert!(pair.is_symmetric());
        assert!((pair.pos - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_distant_magnitudes_replace_bigger_with_weighted_smaller() {
        let cfg = ThresholdConfig {
            weight_for_bigger: 1.1,
            ..ThresholdConfig::default()
        };
        let pair = combine_thresholds(sp(0.04, 0.02), &cfg);
        assert!((pair.pos - 0.08).abs() < 1e-12);
        assert!((pair.neg - 0.088).abs() < 1e-12, "got {}", pair.neg);
    }

    #[test]
    fn test_negative_weight_never_gives_negative_threshold() {
        let cfg = ThresholdConfig {
            weight_for_bigger: -1.0,
            ..ThresholdConfig::default()
        };
        let pair = combine_thresholds(sp(0.02, 0.05), &cfg);
        assert!(pair.neg >= 0.0 && pair.pos >= 0.0, "got {:?}", pair);
    }

    #[test]
    fn test_history_for_short_timeline_uses_global() {
        let series: Vec<_> = (0..3).map(|d| smoothed(d, 0.02, 0.03)).collect();
        let global = global_std(&series, 0.02);
        let (history, failures) = threshold_history(&series, global, &ThresholdConfig::default());
        assert_eq!(history.len(), 3);
        assert_eq!(failures.len(), 3);
        assert!(history.iter().all(|h| h.source == StdSource::Global && h.std == global));
    }

    #[test]
    fn test_swapped_day_exchanges_both_pairs() {
        let day = DailyThreshold {
            day: day(0),
            std: sp(0.01, 0.03),
            source: StdSource::Local,
            thresholds: ThresholdPair { neg: 0.04, pos: 0.12 },
        };
        let swapped = day.swapped();
        assert_eq!(swapped.std, sp(0.03, 0.01));
        assert_eq!(swapped.thresholds, ThresholdPair { neg: 0.12, pos: 0.04 });
    }
}
