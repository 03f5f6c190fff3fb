//! Boundary-aware moving average of correlation days (the CCMA).
//!
//! The previous, current and next correlation days are stitched into one
//! sequence so that averaging windows near midnight see real neighbours
//! instead of a hard edge. Missing neighbours contribute nothing. Only the
//! current day's slice is returned.
//!
//! A smoothed sample is the mean of the valid correlation samples inside a
//! centred window of `twin_mvave` seconds. When those samples cover less than
//! `min_data` seconds the output is `Absent`, however large the few valid
//! values are.

use crate::analysis::DayWindow;
use crate::config::SmoothingConfig;
use crate::model::{CorrelationSeries, Sample, SmoothedSeries, StdPair};
use crate::stats::MirroredMoments;

/// Smoothed series for the current day of `window`.
pub fn smooth_day(window: DayWindow<'_, CorrelationSeries>, cfg: &SmoothingConfig) -> SmoothedSeries {
    let current = window.current;
    let n = current.len();
    let dt_cc = current.dt_cc;
    let half = (cfg.twin_mvave / (2.0 * dt_cc)) as usize;

    // Prefix sums over the stitched sequence of valid values and counts.
    let total = 3 * n;
    let mut sums = Vec::with_capacity(total + 1);
    let mut counts = Vec::with_capacity(total + 1);
    sums.push(0.0);
    counts.push(0usize);
    for day in window.days() {
        for k in 0..n {
            let value = day.and_then(|d| d.samples.get(k)).and_then(|s| s.value());
            let (last_sum, last_count) = (sums[sums.len() - 1], counts[counts.len() - 1]);
            match value {
                Some(v) => {
                    sums.push(last_sum + v);
                    counts.push(last_count + 1);
                }
                None => {
                    sums.push(last_sum);
                    counts.push(last_count);
                }
            }
        }
    }

    let mut samples = Vec::with_capacity(n);
    let mut coverage_s = Vec::with_capacity(n);
    for i in n..2 * n {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(total);
        let count = counts[hi] - counts[lo];
        let coverage = count as f64 * dt_cc;
        coverage_s.push(coverage);

        if count == 0 || coverage < cfg.min_data {
            samples.push(Sample::Absent);
        } else {
            samples.push(Sample::from_raw((sums[hi] - sums[lo]) / count as f64));
        }
    }

    SmoothedSeries {
        station: current.station.clone(),
        day: current.day,
        dt_cc,
        samples,
        coverage_s,
    }
}

// ---------------------------------------------------------------------------
// Population accumulator
// ---------------------------------------------------------------------------

/// Every smoothed value a station produced over the run, split by sign.
///
/// Owned by one station's pipeline. Values gated to `Absent` never enter.
/// `finalize` turns the population into the station's global noise scales.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedPopulation {
    neg: MirroredMoments,
    pos: MirroredMoments,
}

impl SmoothedPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        match sample.value() {
            Some(v) if v < 0.0 => self.neg.push(v),
            Some(v) if v > 0.0 => self.pos.push(v),
            _ => {}
        }
    }

    pub fn push_series(&mut self, series: &SmoothedSeries) {
        series.samples.iter().for_each(|&s| self.push(s));
    }

    pub fn merge(&mut self, other: &SmoothedPopulation) {
        self.neg.merge(&other.neg);
        self.pos.merge(&other.pos);
    }

    /// Number of strictly negative and strictly positive values seen.
    pub fn counts(&self) -> (usize, usize) {
        (self.neg.count(), self.pos.count())
    }

    /// Mirrored std of each side, `None` for an empty side.
    pub fn sides(&self) -> (Option<f64>, Option<f64>) {
        (self.neg.std(), self.pos.std())
    }

    /// Global noise scales. A side with no estimate takes `min_std`.
    pub fn finalize(&self, min_std: f64) -> StdPair {
        let resolve = |std: Option<f64>| std.filter(|s| *s > 0.0).unwrap_or(min_std);
        let (neg, pos) = self.sides();
        StdPair::new(resolve(neg), resolve(pos))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const DT: f64 = 5.0;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, 1).unwrap() + chrono::Duration::days(offset)
    }

    fn series(offset: i64, fill: impl Fn(usize) -> Sample) -> CorrelationSeries {
        let mut s = CorrelationSeries::absent("TSKT", day(offset), DT);
        for (i, sample) in s.samples.iter_mut().enumerate() {
            *sample = fill(i);
        }
        s
    }

    #[test]
    fn test_constant_input_averages_to_itself() {
        let current = series(0, |_| Sample::Valid(0.3));
        let out = smooth_day(DayWindow::new(None, &current, None), &SmoothingConfig::default());
        assert_eq!(out.len(), 17_280);
        let v = out.samples[8_000].value().expect("full coverage");
        assert!((v - 0.3).abs() < 1e-9);
        // Full window is 2 * 300 + 1 samples.
        assert_eq!(out.coverage_s[8_000], 601.0 * DT);
    }

    #[test]
    fn test_sparse_window_is_gated_regardless_of_magnitude() {
        // One valid sample in ten: 60 samples per window, 300 s < 2200 s.
        let current = series(0, |i| if i % 10 == 0 { Sample::Valid(0.9) } else { Sample::Absent });
        let out = smooth_day(DayWindow::new(None, &current, None), &SmoothingConfig::default());
        assert!(out.samples.iter().all(|s| *s == Sample::Absent));
        assert!(out.coverage_s[8_000] > 0.0, "coverage is recorded even when gated");
    }

    #[test]
    fn test_day_edge_uses_neighbouring_days() {
        let days = [
            series(-1, |_| Sample::Valid(0.5)),
            series(0, |_| Sample::Valid(0.1)),
            series(1, |_| Sample::Valid(0.1)),
        ];
        let cfg = SmoothingConfig::default();
        let stitched = smooth_day(DayWindow::around(&days, 1), &cfg);
        let alone = smooth_day(DayWindow::new(None, &days[1], Some(&days[2])), &cfg);

        // At midnight half the window lies in the previous day.
        let v = stitched.samples[0].value().unwrap();
        assert!((v - (300.0 * 0.5 + 301.0 * 0.1) / 601.0).abs() < 1e-9, "got {}", v);
        assert_eq!(stitched.coverage_s[0], 601.0 * DT);

        // Without it the window is clipped to 301 samples (1505 s < 2200 s).
        assert_eq!(alone.samples[0], Sample::Absent);
        assert_eq!(alone.coverage_s[0], 301.0 * DT);
    }

    #[test]
    fn test_absent_samples_do_not_dilute_the_mean() {
        let current = series(0, |i| if i % 2 == 0 { Sample::Valid(0.4) } else { Sample::Absent });
        let cfg = SmoothingConfig {
            twin_mvave: 3000.0,
            min_data: 1000.0,
        };
        let out = smooth_day(DayWindow::new(None, &current, None), &cfg);
        let v = out.samples[8_000].value().unwrap();
        assert!((v - 0.4).abs() < 1e-9, "absent samples must not count as zeros, got {}", v);
    }

    #[test]
    fn test_all_absent_day_smooths_to_absent() {
        let current = CorrelationSeries::absent("TSKT", day(0), DT);
        let out = smooth_day(DayWindow::new(None, &current, None), &SmoothingConfig::default());
        assert_eq!(out, SmoothedSeries::absent("TSKT", day(0), DT));
    }

    #[test]
    fn test_population_splits_by_sign_and_skips_absent() {
        let mut population = SmoothedPopulation::new();
        for s in [Sample::Valid(-0.02), Sample::Absent, Sample::Valid(0.03), Sample::Valid(0.04)] {
            population.push(s);
        }
        assert_eq!(population.counts(), (1, 2));
        let std = population.finalize(0.02);
        assert!((std.neg - 0.02).abs() < 1e-12);
        assert!((std.pos - ((0.0009 + 0.0016) / 2.0_f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_population_falls_back_to_floor() {
        let std = SmoothedPopulation::new().finalize(0.02);
        assert_eq!(std, StdPair::new(0.02, 0.02));
    }
}
