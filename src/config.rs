//! Detector configuration.
//!
//! Parameters live in a TOML file whose sections mirror the pipeline stages.
//! Every section and field is optional; missing values take the reference
//! defaults below. `DetectorConfig::from_env` reads the file path from
//! `SSE_CONFIG` (after loading `.env`), falling back to defaults when unset.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::ingest::quality::QualityLabel;
use crate::model::{Result, SseError, SECONDS_PER_DAY};

/// Largest accepted half-width of the local std window, in days.
pub const MAX_PAR_DAYS: i64 = 3660;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Windowed correlation parameters. All durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Sample interval of the decimated input signals.
    pub dt_dec: f64,
    /// Full correlation window length.
    pub twin: f64,
    /// Output interval of the correlation series.
    pub dt_cc: f64,
    /// Minimum accepted-quality seconds inside a window.
    pub min_twin: f64,
    /// Quality label code that counts as accepted.
    pub accepted_label: String,
    /// Allowed deviation of a day's length from one full day.
    pub length_tolerance_s: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            dt_dec: 1.0,
            twin: 300.0,
            dt_cc: 5.0,
            min_twin: 180.0,
            accepted_label: "b".to_string(),
            length_tolerance_s: 1.0,
        }
    }
}

impl CorrelationConfig {
    /// Window length in decimated samples.
    pub fn window_samples(&self) -> usize {
        (self.twin / self.dt_dec) as usize
    }

    /// The accepted label. Falls back to `Good` for an unknown code, which
    /// `DetectorConfig::validate` rejects anyway.
    pub fn accepted(&self) -> QualityLabel {
        QualityLabel::from_code(&self.accepted_label).unwrap_or(QualityLabel::Good)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Moving-average window length, seconds.
    pub twin_mvave: f64,
    /// Minimum valid correlation seconds inside the window.
    pub min_data: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            twin_mvave: 3000.0,
            min_data: 2200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Standard-deviation multiplier `k`.
    pub n_std: f64,
    /// Half-width of the local estimation window, in days.
    pub par_days: i64,
    /// Minimum days present in the local window.
    pub min_days_required: usize,
    /// Minimum fraction of valid samples in the local window.
    pub min_coverage_ratio: f64,
    /// Ceiling applied to every resolved std.
    pub std_cap: f64,
    /// Floor used when no estimate exists anywhere.
    pub min_std: f64,
    /// Magnitudes within this ratio are unified.
    pub unify_factor: f64,
    /// Multiplier applied to the smaller magnitude when replacing the larger.
    pub weight_for_bigger: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            n_std: 4.0,
            par_days: 28,
            min_days_required: 28,
            min_coverage_ratio: 0.5,
            std_cap: 0.1,
            min_std: 0.02,
            unify_factor: 1.15,
            weight_for_bigger: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Minimum mean coverage (seconds) for an event to be kept.
    pub min_event_coverage: f64,
    /// Close an event still active at the end of the timeline instead of
    /// dropping it.
    pub close_open_events: bool,
    /// Drop events that touch any quality interval not carrying the
    /// accepted label.
    pub screen_by_labels: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_event_coverage: 500.0,
            close_open_events: false,
            screen_by_labels: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Length of one aggregation period.
    pub interval_hours: u32,
    /// Trailing window length.
    pub window_days: u32,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            interval_hours: 2,
            window_days: 5,
        }
    }
}

impl RollingConfig {
    pub fn periods_per_day(&self) -> usize {
        (24 / self.interval_hours) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Above-mean trend points closer than this merge into one episode.
    pub proximity_hours: u32,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { proximity_hours: 24 }
    }
}

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub correlation: CorrelationConfig,
    pub smoothing: SmoothingConfig,
    pub thresholds: ThresholdConfig,
    pub segmentation: SegmentationConfig,
    pub rolling: RollingConfig,
    pub trend: TrendConfig,
}

impl DetectorConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DetectorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Loads configuration from environment variables.
    ///
    /// `SSE_CONFIG` names a TOML file. When unset, defaults are used.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        match env::var("SSE_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Checks cross-field constraints the stages rely on.
    pub fn validate(&self) -> Result<()> {
        let c = &self.correlation;
        positive("correlation.dt_dec", c.dt_dec)?;
        positive("correlation.dt_cc", c.dt_cc)?;
        positive("correlation.twin", c.twin)?;
        if !divides_day(c.dt_cc) {
            return Err(SseError::Config(format!(
                "correlation.dt_cc = {} does not divide a day",
                c.dt_cc
            )));
        }
        if c.window_samples() < 2 {
            return Err(SseError::Config(format!(
                "correlation.twin = {} spans fewer than two samples of {} s",
                c.twin, c.dt_dec
            )));
        }
        if QualityLabel::from_code(&c.accepted_label).is_none() {
            return Err(SseError::Config(format!(
                "correlation.accepted_label '{}' is not a quality label",
                c.accepted_label
            )));
        }
        non_negative("correlation.length_tolerance_s", c.length_tolerance_s)?;
        non_negative("correlation.min_twin", c.min_twin)?;

        positive("smoothing.twin_mvave", self.smoothing.twin_mvave)?;
        non_negative("smoothing.min_data", self.smoothing.min_data)?;

        let t = &self.thresholds;
        positive("thresholds.n_std", t.n_std)?;
        positive("thresholds.std_cap", t.std_cap)?;
        positive("thresholds.min_std", t.min_std)?;
        if !(0..=MAX_PAR_DAYS).contains(&t.par_days) {
            return Err(SseError::Config(format!(
                "thresholds.par_days = {} is outside [0, {}]",
                t.par_days, MAX_PAR_DAYS
            )));
        }
        non_negative("thresholds.weight_for_bigger", t.weight_for_bigger)?;
        if !(0.0..=1.0).contains(&t.min_coverage_ratio) {
            return Err(SseError::Config(format!(
                "thresholds.min_coverage_ratio = {} is outside [0, 1]",
                t.min_coverage_ratio
            )));
        }
        if t.unify_factor < 1.0 {
            return Err(SseError::Config(format!(
                "thresholds.unify_factor = {} is below 1",
                t.unify_factor
            )));
        }

        non_negative("segmentation.min_event_coverage", self.segmentation.min_event_coverage)?;

        let r = &self.rolling;
        if r.interval_hours == 0 || 24 % r.interval_hours != 0 {
            return Err(SseError::Config(format!(
                "rolling.interval_hours = {} does not divide 24",
                r.interval_hours
            )));
        }
        if r.window_days == 0 {
            return Err(SseError::Config("rolling.window_days must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SseError::Config(format!("{} must be positive, got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SseError::Config(format!("{} must be non-negative, got {}", name, value)))
    }
}

fn divides_day(dt: f64) -> bool {
    let n = SECONDS_PER_DAY / dt;
    (n - n.round()).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        DetectorConfig::default()
            .validate()
            .expect("reference defaults must validate");
    }

    #[test]
    fn test_partial_toml_keeps_defaults_for_missing_fields() {
        let config = DetectorConfig::from_toml_str(
            r#"
            [smoothing]
            twin_mvave = 10000.0

            [thresholds]
            n_std = 3.5
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.smoothing.twin_mvave, 10000.0);
        assert_eq!(config.smoothing.min_data, 2200.0);
        assert_eq!(config.thresholds.n_std, 3.5);
        assert_eq!(config.correlation.dt_cc, 5.0);
        assert_eq!(config.rolling.window_days, 5);
    }

    #[test]
    fn test_dt_cc_must_divide_a_day() {
        let err = DetectorConfig::from_toml_str("[correlation]\ndt_cc = 7.0\n").unwrap_err();
        assert!(err.to_string().contains("does not divide a day"), "got: {}", err);
    }

    #[test]
    fn test_interval_hours_must_divide_24() {
        let err = DetectorConfig::from_toml_str("[rolling]\ninterval_hours = 5\n").unwrap_err();
        assert!(matches!(err, SseError::Config(_)));
    }

    #[test]
    fn test_unify_factor_below_one_rejected() {
        let err = DetectorConfig::from_toml_str("[thresholds]\nunify_factor = 0.9\n").unwrap_err();
        assert!(err.to_string().contains("unify_factor"));
    }

    #[test]
    fn test_unknown_accepted_label_rejected() {
        let err = DetectorConfig::from_toml_str("[correlation]\naccepted_label = \"z\"\n").unwrap_err();
        assert!(err.to_string().contains("accepted_label"), "got: {}", err);
    }

    #[test]
    fn test_oversized_par_days_rejected() {
        let err = DetectorConfig::from_toml_str("[thresholds]\npar_days = 1000000000\n").unwrap_err();
        assert!(err.to_string().contains("par_days"), "got: {}", err);
        assert!(DetectorConfig::from_toml_str("[thresholds]\npar_days = 3660\n").is_ok());
    }

    #[test]
    fn test_negative_weight_for_bigger_rejected() {
        let err = DetectorConfig::from_toml_str("[thresholds]\nweight_for_bigger = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("weight_for_bigger"), "got: {}", err);
        assert!(DetectorConfig::from_toml_str("[thresholds]\nweight_for_bigger = 0.0\n").is_ok());
    }

    #[test]
    fn test_negative_minimum_durations_rejected() {
        for (text, field) in [
            ("[correlation]\nmin_twin = -1.0\n", "min_twin"),
            ("[smoothing]\nmin_data = -5.0\n", "min_data"),
            ("[segmentation]\nmin_event_coverage = -500.0\n", "min_event_coverage"),
        ] {
            let err = DetectorConfig::from_toml_str(text).unwrap_err();
            assert!(err.to_string().contains(field), "{} should be rejected, got: {}", field, err);
        }
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = DetectorConfig::from_toml_str("[smoothing\n").unwrap_err();
        assert!(matches!(err, SseError::Toml(_)));
    }

    #[test]
    fn test_window_samples_and_periods_per_day() {
        let config = DetectorConfig::default();
        assert_eq!(config.correlation.window_samples(), 300);
        assert_eq!(config.rolling.periods_per_day(), 12);
    }
}
