//! Windowed correlation between the envelope and low-frequency series.
//!
//! For every output offset `t = i * dt_cc` the engine takes a window of
//! `twin` seconds centred on the decimated sample at `t` and computes the
//! zero-mean correlation coefficient of the two series inside it. A window
//! produces `Sample::Absent` when:
//!
//! - any part of it lies outside the available signal (edges of the day
//!   reach into the neighbouring days, which may be missing);
//! - fewer than `min_twin` seconds inside it carry the accepted quality
//!   label;
//! - either segment is constant (no variance to correlate).
//!
//! The three days of a [`DayWindow`] are laid out on one timeline so that
//! windows near midnight read straight across the day boundary.

use crate::analysis::DayWindow;
use crate::config::CorrelationConfig;
use crate::ingest::source::StationDay;
use crate::ingest::validation::expected_samples;
use crate::model::{samples_per_day, CorrelationSeries, Sample};

/// Correlation series for the current day of `window`.
///
/// A current day without signal yields the all-absent series.
pub fn correlate_day(
    station: &str,
    window: DayWindow<'_, StationDay>,
    cfg: &CorrelationConfig,
) -> CorrelationSeries {
    let current = window.current;
    if !current.has_signal() {
        return CorrelationSeries::absent(station, current.day, cfg.dt_cc);
    }

    let timeline = Timeline::build(&window, cfg);
    let n_cc = samples_per_day(cfg.dt_cc);
    let half = cfg.window_samples() / 2;

    let samples = (0..n_cc)
        .map(|i| {
            let offset = (i as f64 * cfg.dt_cc / cfg.dt_dec) as usize;
            let center = timeline.origin + offset;
            match center.checked_sub(half) {
                Some(lo) => timeline.correlate(lo, center + half, cfg),
                None => Sample::Absent,
            }
        })
        .collect();

    CorrelationSeries {
        station: station.to_string(),
        day: current.day,
        dt_cc: cfg.dt_cc,
        samples,
    }
}

/// Zero-mean correlation coefficient of two equal-length segments.
///
/// `None` for empty or mismatched input and for degenerate segments: a
/// constant segment has no variance, and is caught by a range check before
/// floating-point residue from the mean subtraction can fake one.
pub fn zero_mean_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() || is_constant(a) || is_constant(b) {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        dot += dx * dy;
        norm_a += dx * dx;
        norm_b += dy * dy;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

fn is_constant(values: &[f64]) -> bool {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    max == min
}

// ---------------------------------------------------------------------------
// Three-day timeline
// ---------------------------------------------------------------------------

/// Previous, current and next day laid end to end at the decimated rate.
/// Each day occupies exactly one day's worth of slots; slots past the end
/// of a short or missing day are unavailable.
struct Timeline {
    envelope: Vec<f64>,
    low_freq: Vec<f64>,
    /// Prefix counts of available slots.
    available: Vec<usize>,
    /// Prefix counts of slots carrying the accepted label.
    accepted: Vec<usize>,
    /// Index of the current day's first slot.
    origin: usize,
}

impl Timeline {
    fn build(window: &DayWindow<'_, StationDay>, cfg: &CorrelationConfig) -> Self {
        let per_day = expected_samples(cfg);
        let accepted_label = cfg.accepted();
        let total = 3 * per_day;

        let mut envelope = vec![0.0; total];
        let mut low_freq = vec![0.0; total];
        let mut available = vec![0usize; total + 1];
        let mut accepted = vec![0usize; total + 1];

        for (slot, day) in window.days().into_iter().enumerate() {
            let base = slot * per_day;
            let signals = day.and_then(|d| d.signals.as_ref());
            let labels = day.and_then(|d| d.labels.as_ref());
            let len = signals.map_or(0, |s| s.len().min(per_day));

            if let Some(s) = signals {
                envelope[base..base + len].copy_from_slice(&s.envelope[..len]);
                low_freq[base..base + len].copy_from_slice(&s.low_freq[..len]);
            }
            for k in 0..per_day {
                let is_available = k < len;
                let is_accepted = is_available
                    && labels.and_then(|l| l.label_at(k as f64 * cfg.dt_dec)) == Some(accepted_label);
                available[base + k + 1] = available[base + k] + usize::from(is_available);
                accepted[base + k + 1] = accepted[base + k] + usize::from(is_accepted);
            }
        }

        Self {
            envelope,
            low_freq,
            available,
            accepted,
            origin: per_day,
        }
    }

    /// Correlation over slots `[lo, hi)`.
    fn correlate(&self, lo: usize, hi: usize, cfg: &CorrelationConfig) -> Sample {
        if hi > self.envelope.len() || hi <= lo {
            return Sample::Absent;
        }
        if self.available[hi] - self.available[lo] != hi - lo {
            return Sample::Absent;
        }
        let accepted_s = (self.accepted[hi] - self.accepted[lo]) as f64 * cfg.dt_dec;
        if accepted_s < cfg.min_twin {
            return Sample::Absent;
        }
        zero_mean_correlation(&self.envelope[lo..hi], &self.low_freq[lo..hi])
            .map_or(Sample::Absent, Sample::from_raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
