//! Core data types for the slow-slip detection pipeline.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no pipeline logic and no I/O: only series, thresholds, events,
//! summaries and the crate error type.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Time constants
// ---------------------------------------------------------------------------

/// Length of one analysis day, in seconds.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Number of samples a day holds at sampling interval `dt` (seconds).
pub fn samples_per_day(dt: f64) -> usize {
    (SECONDS_PER_DAY / dt).round() as usize
}

/// Midnight UTC at the start of `day`.
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Timestamp `offset_s` seconds after midnight of `day`.
pub fn timestamp_at(day: NaiveDate, offset_s: f64) -> DateTime<Utc> {
    day_start(day) + Duration::milliseconds((offset_s * 1000.0).round() as i64)
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One correlation or smoothed value.
///
/// `Absent` marks "not computed" (rejected window, missing day, gated
/// average). It never takes part in a mean or a standard deviation. At the
/// output boundary it serialises to a literal `0.0`, matching the zero
/// sentinel downstream consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Sample {
    Valid(f64),
    #[default]
    Absent,
}

impl Sample {
    /// Interprets a raw boundary value: zero and non-finite values are absent.
    pub fn from_raw(value: f64) -> Self {
        if value == 0.0 || !value.is_finite() {
            Sample::Absent
        } else {
            Sample::Valid(value)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Sample::Valid(v) => Some(v),
            Sample::Absent => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Sample::Valid(_))
    }

    /// Boundary representation: the value, or `0.0` when absent.
    pub fn or_zero(self) -> f64 {
        self.value().unwrap_or(0.0)
    }

    /// Sign-flipped copy; absent stays absent.
    pub fn negated(self) -> Self {
        match self {
            Sample::Valid(v) => Sample::Valid(-v),
            Sample::Absent => Sample::Absent,
        }
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.or_zero())
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Ok(Sample::from_raw(raw))
    }
}

// ---------------------------------------------------------------------------
// Input signals
// ---------------------------------------------------------------------------

/// The two preprocessed series the waveform preprocessor delivers for one
/// station and day, both at the decimated rate.
///
/// `envelope` is the band-limited high-frequency energy; `low_freq` is the
/// integrated low-frequency trace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailySignalPair {
    pub envelope: Vec<f64>,
    pub low_freq: Vec<f64>,
}

impl DailySignalPair {
    pub fn new(envelope: Vec<f64>, low_freq: Vec<f64>) -> Self {
        Self { envelope, low_freq }
    }

    /// Constant-valued pair, mostly useful for degenerate-input checks.
    pub fn flat(len: usize, envelope_level: f64, low_freq_level: f64) -> Self {
        Self {
            envelope: vec![envelope_level; len],
            low_freq: vec![low_freq_level; len],
        }
    }

    pub fn len(&self) -> usize {
        self.envelope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Derived series
// ---------------------------------------------------------------------------

/// Windowed correlation for one station and day at the coarse interval `dt_cc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSeries {
    pub station: String,
    pub day: NaiveDate,
    pub dt_cc: f64,
    pub samples: Vec<Sample>,
}

impl CorrelationSeries {
    /// A day with nothing computed. Downstream stages treat it exactly like
    /// a day that was never delivered.
    pub fn absent(station: &str, day: NaiveDate, dt_cc: f64) -> Self {
        Self {
            station: station.to_string(),
            day,
            dt_cc,
            samples: vec![Sample::Absent; samples_per_day(dt_cc)],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_valid()).count()
    }

    /// `(offset-in-day seconds, value)` rows with absent samples written as 0.
    pub fn rows(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i as f64 * self.dt_cc, s.or_zero()))
            .collect()
    }
}

/// Boundary-aware moving average of a correlation day (the CCMA).
///
/// `coverage_s[i]` holds the seconds of valid correlation input inside the
/// averaging window of sample `i`. It is recorded even when the sample itself
/// was gated to `Absent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSeries {
    pub station: String,
    pub day: NaiveDate,
    pub dt_cc: f64,
    pub samples: Vec<Sample>,
    pub coverage_s: Vec<f64>,
}

impl SmoothedSeries {
    pub fn absent(station: &str, day: NaiveDate, dt_cc: f64) -> Self {
        let n = samples_per_day(dt_cc);
        Self {
            station: station.to_string(),
            day,
            dt_cc,
            samples: vec![Sample::Absent; n],
            coverage_s: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Values that survived the minimum-data gate.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().filter_map(|s| s.value())
    }

    pub fn timestamp(&self, index: usize) -> DateTime<Utc> {
        timestamp_at(self.day, index as f64 * self.dt_cc)
    }

    pub fn rows(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i as f64 * self.dt_cc, s.or_zero()))
            .collect()
    }

    /// Sign-flipped copy. The original series is left untouched.
    pub fn negated(&self) -> Self {
        Self {
            samples: self.samples.iter().map(|s| s.negated()).collect(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Statistical estimates and thresholds
// ---------------------------------------------------------------------------

/// One-sided noise scales: `neg` from the negative tail, `pos` from the
/// positive tail. Both are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StdPair {
    pub neg: f64,
    pub pos: f64,
}

impl StdPair {
    pub fn new(neg: f64, pos: f64) -> Self {
        Self { neg, pos }
    }

    /// Caps each side at `ceiling`.
    pub fn capped(self, ceiling: f64) -> Self {
        Self {
            neg: self.neg.min(ceiling),
            pos: self.pos.min(ceiling),
        }
    }

    /// Pair as seen after a sign inversion of the series.
    pub fn swapped(self) -> Self {
        Self {
            neg: self.pos,
            pos: self.neg,
        }
    }
}

/// Decision thresholds for one station and period, stored as non-negative
/// magnitudes. The negative threshold is applied as `-neg`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub neg: f64,
    pub pos: f64,
}

impl ThresholdPair {
    pub fn swapped(self) -> Self {
        Self {
            neg: self.pos,
            pos: self.neg,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        self.neg == self.pos
    }

    /// True when `value` lies beyond the threshold for `direction`.
    pub fn exceeded_by(&self, value: f64, direction: Direction) -> bool {
        match direction {
            Direction::Positive => value > self.pos,
            Direction::Negative => value < -self.neg,
        }
    }
}

// ---------------------------------------------------------------------------
// Detection output
// ---------------------------------------------------------------------------

/// Excursion polarity, in the station's resolved sign convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn all() -> [Direction; 2] {
        [Direction::Positive, Direction::Negative]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Positive => "pos",
            Direction::Negative => "neg",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A closed excursion of the smoothed correlation beyond its threshold.
///
/// Coverage statistics describe the valid-input seconds behind each sample
/// of the span `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub station: String,
    pub direction: Direction,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub weighted_time: DateTime<Utc>,
    pub coverage_mean: f64,
    pub coverage_std: f64,
    pub coverage_start: f64,
    pub coverage_q1: f64,
    pub coverage_median: f64,
    pub coverage_q3: f64,
    pub coverage_end: f64,
    pub peak: f64,
}

impl DetectionEvent {
    pub fn duration_seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    pub fn overlaps(&self, other: &DetectionEvent) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Per-station run record, written whether or not anything was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSummary {
    pub station: String,
    pub days_processed: usize,
    pub days_with_data: usize,
    pub detections: usize,
    pub negative_detections: usize,
    pub detected_seconds: f64,
    pub global_std: StdPair,
    pub sign_inverted: bool,
    pub start_day: NaiveDate,
    pub end_day: NaiveDate,
}

/// One period of the rolling activity trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Trailing-window exceedance mass converted to hours.
    pub accumulated_hours: f64,
    /// Exceedance mass of this period alone.
    pub mass: f64,
    pub samples: usize,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while loading configuration or preparing station days.
///
/// Per-day variants are recovered by the pipeline (logged, day treated as
/// absent); they only surface to callers of the individual stages.
#[derive(Debug, thiserror::Error)]
pub enum SseError {
    #[error("no data for station {station} on {day}")]
    MissingDay { station: String, day: NaiveDate },

    #[error("shape mismatch for station {station} on {day}: {detail}")]
    ShapeMismatch {
        station: String,
        day: NaiveDate,
        detail: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown station: {0}")]
    UnknownStation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SseError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
