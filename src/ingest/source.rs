//! Boundaries to the external collaborators that deliver station days.
//!
//! The waveform preprocessor and the quality classifier run outside this
//! crate. They are reached through the `SignalSource` and `QualitySource`
//! traits, one call per station and day. Both must be `Sync` because the
//! network runner fetches days for several stations at once.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::config::CorrelationConfig;
use crate::ingest::quality::QualityLabels;
use crate::ingest::validation::validate_day;
use crate::logging::{self, Stage};
use crate::model::{DailySignalPair, Result, SseError};

/// Delivers the preprocessed envelope/low-frequency pair for a station day.
///
/// An unavailable day is reported as `SseError::MissingDay`.
pub trait SignalSource: Sync {
    fn signals(&self, station: &str, day: NaiveDate) -> Result<DailySignalPair>;
}

/// Delivers the quality labels covering a station day.
pub trait QualitySource: Sync {
    fn labels(&self, station: &str, day: NaiveDate) -> Result<QualityLabels>;
}

// ---------------------------------------------------------------------------
// Prepared station day
// ---------------------------------------------------------------------------

/// One station day after retrieval and shape checks. `None` means the
/// collaborator had nothing usable for that day.
#[derive(Debug, Clone, PartialEq)]
pub struct StationDay {
    pub day: NaiveDate,
    pub signals: Option<DailySignalPair>,
    pub labels: Option<QualityLabels>,
}

impl StationDay {
    pub fn missing(day: NaiveDate) -> Self {
        Self {
            day,
            signals: None,
            labels: None,
        }
    }

    /// True when a validated signal pair is present.
    pub fn has_signal(&self) -> bool {
        self.signals.is_some()
    }
}

/// Retrieves and validates one station day. Failures never propagate: they
/// are logged and the affected part of the day is left empty.
pub fn fetch_day<S, Q>(
    signals: &S,
    quality: &Q,
    station: &str,
    day: NaiveDate,
    cfg: &CorrelationConfig,
) -> StationDay
where
    S: SignalSource + ?Sized,
    Q: QualitySource + ?Sized,
{
    let pair = signals
        .signals(station, day)
        .and_then(|pair| validate_day(station, day, pair, cfg));
    let pair = match pair {
        Ok(pair) => Some(pair),
        Err(e) => {
            logging::log_day_failure(Stage::Ingest, station, day, &e);
            None
        }
    };

    // Labels only matter for days with signal.
    let labels = match pair {
        Some(_) => match quality.labels(station, day) {
            Ok(labels) if !labels.is_empty() => Some(labels),
            Ok(_) => {
                let e = SseError::MissingDay {
                    station: station.to_string(),
                    day,
                };
                logging::log_day_failure(Stage::Ingest, station, day, &e);
                None
            }
            Err(e) => {
                logging::log_day_failure(Stage::Ingest, station, day, &e);
                None
            }
        },
        None => None,
    };

    StationDay {
        day,
        signals: pair,
        labels,
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Station days held in memory, keyed by station code and day. Serves as
/// both signal and quality source.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    signals: HashMap<(String, NaiveDate), DailySignalPair>,
    labels: HashMap<(String, NaiveDate), QualityLabels>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_day(
        &mut self,
        station: &str,
        day: NaiveDate,
        pair: DailySignalPair,
        labels: QualityLabels,
    ) {
        self.signals.insert((station.to_string(), day), pair);
        self.labels.insert((station.to_string(), day), labels);
    }

    pub fn insert_signals(&mut self, station: &str, day: NaiveDate, pair: DailySignalPair) {
        self.signals.insert((station.to_string(), day), pair);
    }

    pub fn insert_labels(&mut self, station: &str, day: NaiveDate, labels: QualityLabels) {
        self.labels.insert((station.to_string(), day), labels);
    }

    pub fn day_count(&self) -> usize {
        self.signals.len()
    }
}

impl SignalSource for InMemorySource {
    fn signals(&self, station: &str, day: NaiveDate) -> Result<DailySignalPair> {
        self.signals
            .get(&(station.to_string(), day))
            .cloned()
            .ok_or_else(|| SseError::MissingDay {
                station: station.to_string(),
                day,
            })
    }
}

impl QualitySource for InMemorySource {
    fn labels(&self, station: &str, day: NaiveDate) -> Result<QualityLabels> {
        self.labels
            .get(&(station.to_string(), day))
            .cloned()
            .ok_or_else(|| SseError::MissingDay {
                station: station.to_string(),
                day,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::quality::QualityLabel;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 2, 10).unwrap()
    }

    #[test]
    fn test_fetch_day_returns_validated_pair_and_labels() {
        let mut source = InMemorySource::new();
        source.insert_day(
            "CCOL",
            day(),
            DailySignalPair::flat(86_400, 1.0, 1.0),
            QualityLabels::uniform(QualityLabel::Good, 1440),
        );
        let prepared = fetch_day(&source, &source, "CCOL", day(), &CorrelationConfig::default());
        assert!(prepared.has_signal());
        assert_eq!(prepared.labels.map(|l| l.len()), Some(1440));
    }

    #[test]
    fn test_fetch_day_for_unknown_day_is_missing() {
        let source = InMemorySource::new();
        let prepared = fetch_day(&source, &source, "CCOL", day(), &CorrelationConfig::default());
        assert_eq!(prepared, StationDay::missing(day()));
    }

    #[test]
    fn test_malformed_day_is_dropped() {
        let mut source = InMemorySource::new();
        source.insert_day(
            "CCOL",
            day(),
            DailySignalPair::flat(40_000, 1.0, 1.0),
            QualityLabels::uniform(QualityLabel::Good, 1440),
        );
        let prepared = fetch_day(&source, &source, "CCOL", day(), &CorrelationConfig::default());
        assert!(!prepared.has_signal(), "a half-length day must be treated as missing");
        assert!(prepared.labels.is_none());
    }

    #[test]
    fn test_signal_without_labels_keeps_signal() {
        let mut source = InMemorySource::new();
        source.insert_signals("CCOL", day(), DailySignalPair::flat(86_400, 1.0, 1.0));
        let prepared = fetch_day(&source, &source, "CCOL", day(), &CorrelationConfig::default());
        assert!(prepared.has_signal());
        assert!(prepared.labels.is_none());
    }
}
