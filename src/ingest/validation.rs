//! Shape checks for delivered station days.
//!
//! The preprocessor is trusted once a day has the right shape: both series
//! the same length, and that length within `length_tolerance_s` of one full
//! day at the decimated rate. Anything else is rejected here and the day is
//! treated as missing downstream.

use chrono::NaiveDate;

use crate::config::CorrelationConfig;
use crate::model::{samples_per_day, DailySignalPair, Result, SseError};

/// Expected sample count of one day at the decimated rate.
pub fn expected_samples(cfg: &CorrelationConfig) -> usize {
    samples_per_day(cfg.dt_dec)
}

/// Checks a delivered day and returns a cleaned copy.
///
/// Non-finite samples are replaced by zero; samples past the end of the day
/// (allowed by the tolerance) are dropped. A short day keeps its length and
/// its missing tail counts as unavailable signal.
pub fn validate_day(
    station: &str,
    day: NaiveDate,
    pair: DailySignalPair,
    cfg: &CorrelationConfig,
) -> Result<DailySignalPair> {
    let mismatch = |detail: String| SseError::ShapeMismatch {
        station: station.to_string(),
        day,
        detail,
    };

    if pair.envelope.len() != pair.low_freq.len() {
        return Err(mismatch(format!(
            "envelope has {} samples, low-frequency series has {}",
            pair.envelope.len(),
            pair.low_freq.len()
        )));
    }
    if pair.is_empty() {
        return Err(SseError::MissingDay {
            station: station.to_string(),
            day,
        });
    }

    let expected = expected_samples(cfg);
    let deviation_s = (pair.len() as f64 - expected as f64).abs() * cfg.dt_dec;
    if deviation_s > cfg.length_tolerance_s {
        return Err(mismatch(format!(
            "{} samples, expected {} (tolerance {} s)",
            pair.len(),
            expected,
            cfg.length_tolerance_s
        )));
    }

    let mut envelope = scrub(pair.envelope);
    let mut low_freq = scrub(pair.low_freq);
    envelope.truncate(expected);
    low_freq.truncate(expected);
    Ok(DailySignalPair::new(envelope, low_freq))
}

fn scrub(values: Vec<f64>) -> Vec<f64> {
    values
        .into_iter()
        .map(|v| if v.is_finite() { v } else { 0.0 })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
