//! Per-station orchestration and the network runner.
//!
//! A station run fetches every day of the range (plus one padding day on
//! each side, used only as neighbours), then:
//!
//! 1. correlates and smooths the days in parallel;
//! 2. estimates thresholds over the whole timeline;
//! 3. resolves the sign convention;
//! 4. segments events and aggregates the rolling trend in time order.
//!
//! No stage error aborts a run. Bad days are logged and treated as absent.
//! Stations share nothing, so `run_network` runs them on the rayon pool.

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::analysis::correlation::correlate_day;
use crate::analysis::smoothing::{smooth_day, SmoothedPopulation};
use crate::analysis::DayWindow;
use crate::config::DetectorConfig;
use crate::detection::polarity::{self, ResolvedTimeline, SignDecision};
use crate::detection::rolling::{self, RollingTrends};
use crate::detection::segmentation::{screen_events, segment_all};
use crate::detection::thresholds::{threshold_history, DailyThreshold, StdSource};
use crate::ingest::quality::QualityLabels;
use crate::ingest::source::{fetch_day, QualitySource, SignalSource, StationDay};
use crate::logging::{self, Stage};
use crate::model::{
    CorrelationSeries, DetectionEvent, Direction, Result, SmoothedSeries, SseError, StationSummary,
    StdPair,
};
use crate::stations::Station;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Everything one station run produces, keyed by day where applicable.
///
/// Series and thresholds are in the station's original sign convention;
/// events and trends are in the resolved one (see `sign`).
#[derive(Debug, Clone)]
pub struct StationResult {
    pub station: String,
    pub correlation: Vec<CorrelationSeries>,
    pub smoothed: Vec<SmoothedSeries>,
    pub thresholds: Vec<DailyThreshold>,
    pub global_std: StdPair,
    pub sign: SignDecision,
    pub events: Vec<DetectionEvent>,
    pub trends: RollingTrends,
    pub summary: StationSummary,
}

impl StationResult {
    pub fn positive_events(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.events.iter().filter(|e| e.direction == Direction::Positive)
    }
}

/// Inclusive list of days from `start` to `end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

// ---------------------------------------------------------------------------
// Station pipeline
// ---------------------------------------------------------------------------

pub struct StationPipeline {
    station: Station,
    config: DetectorConfig,
}

impl StationPipeline {
    /// Pipeline for `station` with its overrides applied to `base`.
    pub fn new(station: &Station, base: &DetectorConfig) -> Result<Self> {
        let config = station.effective_config(base);
        config.validate().map_err(|e| {
            SseError::Config(format!("station {}: {}", station.code, e))
        })?;
        Ok(Self {
            station: station.clone(),
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs every stage over `[start, end]`.
    pub fn run<S, Q>(&self, signals: &S, quality: &Q, start: NaiveDate, end: NaiveDate) -> StationResult
    where
        S: SignalSource + ?Sized,
        Q: QualitySource + ?Sized,
    {
        let code = self.station.code.as_str();
        let cfg = &self.config;
        let days = days_between(start, end);
        logging::info(
            Stage::Pipeline,
            Some(code),
            &format!("processing {} days {}..{}", days.len(), start, end),
        );

        // Padding days feed window edges only.
        let padded: Vec<NaiveDate> = std::iter::once(start - Duration::days(1))
            .chain(days.iter().copied())
            .chain(std::iter::once(end + Duration::days(1)))
            .collect();
        let fetched: Vec<StationDay> = padded
            .par_iter()
            .map(|&day| fetch_day(signals, quality, code, day, &cfg.correlation))
            .collect();

        let correlation_padded: Vec<CorrelationSeries> = (0..fetched.len())
            .into_par_iter()
            .map(|i| correlate_day(code, DayWindow::around(&fetched, i), &cfg.correlation))
            .collect();

        let smoothed: Vec<SmoothedSeries> = (1..correlation_padded.len() - 1)
            .into_par_iter()
            .map(|i| smooth_day(DayWindow::around(&correlation_padded, i), &cfg.smoothing))
            .collect();
        let correlation = correlation_padded[1..correlation_padded.len() - 1].to_vec();
        let inner = &fetched[1..fetched.len() - 1];

        for series in &correlation {
            logging::debug(
                Stage::Correlation,
                Some(code),
                &format!("{}: {} of {} windows valid", series.day, series.valid_count(), series.len()),
            );
        }
        for series in &smoothed {
            logging::debug(
                Stage::Smoothing,
                Some(code),
                &format!(
                    "{}: {} of {} smoothed samples valid",
                    series.day,
                    series.valid_values().count(),
                    series.len()
                ),
            );
        }

        let mut population = SmoothedPopulation::new();
        smoothed.iter().for_each(|s| population.push_series(s));
        let global_std = population.finalize(cfg.thresholds.min_std);
        if population.counts() == (0, 0) {
            logging::warn(
                Stage::Threshold,
                Some(code),
                &format!("no valid smoothed values, using floor std {}", cfg.thresholds.min_std),
            );
        }

        let (history, failures) = threshold_history(&smoothed, global_std, &cfg.thresholds);
        for (day, failure) in &failures {
            logging::debug(
                Stage::Threshold,
                Some(code),
                &format!("{}: local std unavailable ({:?})", day, failure),
            );
        }
        let global_days = history.iter().filter(|h| h.source == StdSource::Global).count();
        if global_days > 0 {
            logging::info(
                Stage::Threshold,
                Some(code),
                &format!("{} of {} days use the global std", global_days, history.len()),
            );
        }

        let resolved = polarity::resolve(&smoothed, &history);
        if resolved.decision.inverted {
            logging::info(
                Stage::Threshold,
                Some(code),
                &format!(
                    "sign inverted ({} samples below vs {} above)",
                    resolved.decision.below, resolved.decision.above
                ),
            );
        }

        let events = self.detect(code, &resolved, inner);
        let trends = rolling::aggregate(code, &resolved, &cfg.rolling, cfg.thresholds.n_std);

        let summary = StationSummary {
            station: code.to_string(),
            days_processed: days.len(),
            days_with_data: inner.iter().filter(|d| d.has_signal()).count(),
            detections: events.iter().filter(|e| e.direction == Direction::Positive).count(),
            negative_detections: events.iter().filter(|e| e.direction == Direction::Negative).count(),
            detected_seconds: events
                .iter()
                .filter(|e| e.direction == Direction::Positive)
                .map(|e| e.duration_seconds())
                .sum(),
            global_std,
            sign_inverted: resolved.decision.inverted,
            start_day: start,
            end_day: end,
        };
        logging::log_station_summary(&summary);

        StationResult {
            station: code.to_string(),
            correlation,
            smoothed,
            thresholds: history,
            global_std,
            sign: resolved.decision,
            events,
            trends,
            summary,
        }
    }

    fn detect(&self, code: &str, resolved: &ResolvedTimeline, days: &[StationDay]) -> Vec<DetectionEvent> {
        let cfg = &self.config;
        let (events, per_direction) = segment_all(code, resolved, &cfg.segmentation);

        for (direction, seg) in &per_direction {
            if seg.rejected > 0 {
                logging::debug(
                    Stage::Segmentation,
                    Some(code),
                    &format!("{} {} runs below minimum coverage", seg.rejected, direction),
                );
            }
            if let Some(start) = seg.dropped_open {
                logging::warn(
                    Stage::Segmentation,
                    Some(code),
                    &format!("{} run open since {} dropped at end of range", direction, start),
                );
            }
        }

        if !cfg.segmentation.screen_by_labels {
            return events;
        }
        let labels: HashMap<NaiveDate, QualityLabels> = days
            .iter()
            .filter_map(|d| d.labels.clone().map(|l| (d.day, l)))
            .collect();
        let screened = screen_events(&events, &labels, cfg.correlation.accepted());
        if screened.len() < events.len() {
            logging::info(
                Stage::Segmentation,
                Some(code),
                &format!("{} events removed by quality screening", events.len() - screened.len()),
            );
        }
        screened
    }
}

// ---------------------------------------------------------------------------
// Network runner
// ---------------------------------------------------------------------------

/// Runs every station over `[start, end]` concurrently.
///
/// Fails only on invalid input (range or configuration); per-day and
/// per-station data problems are logged and absorbed.
pub fn run_network<S, Q>(
    stations: &[Station],
    signals: &S,
    quality: &Q,
    start: NaiveDate,
    end: NaiveDate,
    config: &DetectorConfig,
) -> Result<Vec<StationResult>>
where
    S: SignalSource,
    Q: QualitySource,
{
    if end < start {
        return Err(SseError::Config(format!("end day {} is before start day {}", end, start)));
    }
    let pipelines = stations
        .iter()
        .map(|s| {
            StationPipeline::new(s, config).inspect_err(|e| {
                logging::error(Stage::Pipeline, Some(&s.code), &format!("rejected station config: {}", e));
            })
        })
        .collect::<Result<Vec<_>>>()?;

    logging::info(
        Stage::Pipeline,
        None,
        &format!("running {} stations over {}..{}", pipelines.len(), start, end),
    );
    Ok(pipelines
        .par_iter()
        .map(|p| p.run(signals, quality, start, end))
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::quality::QualityLabel;
    use crate::ingest::source::InMemorySource;
    use crate::model::DailySignalPair;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 10).unwrap() + Duration::days(offset)
    }

    #[test]
    fn test_days_between_is_inclusive() {
        assert_eq!(days_between(day(0), day(2)), vec![day(0), day(1), day(2)]);
        assert_eq!(days_between(day(0), day(0)), vec![day(0)]);
        assert!(days_between(day(1), day(0)).is_empty());
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let source = InMemorySource::new();
        let err = run_network(
            &[Station::new("RIOS")],
            &source,
            &source,
            day(1),
            day(0),
            &DetectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SseError::Config(_)));
    }

    #[test]
    fn test_invalid_station_override_is_rejected() {
        let station = Station {
            dt_cc: Some(7.0),
            ..Station::new("RIOS")
        };
        assert!(StationPipeline::new(&station, &DetectorConfig::default()).is_err());
    }

    #[test]
    fn test_station_without_data_still_gets_a_summary() {
        let source = InMemorySource::new();
        let pipeline = StationPipeline::new(&Station::new("TSKT"), &DetectorConfig::default()).unwrap();
        let result = pipeline.run(&source, &source, day(0), day(1));
        assert_eq!(result.summary.days_processed, 2);
        assert_eq!(result.summary.days_with_data, 0);
        assert_eq!(result.summary.detections, 0);
        assert_eq!(result.global_std, StdPair::new(0.02, 0.02));
        assert_eq!(result.correlation.len(), 2);
        assert_eq!(result.trends.positive.points.len(), 24);
    }

    #[test]
    fn test_padding_days_are_not_reported() {
        let mut source = InMemorySource::new();
        for d in -1..=1 {
            source.insert_day(
                "TSKT",
                day(d),
                DailySignalPair::flat(86_400, 1.0, 1.0),
                QualityLabels::uniform(QualityLabel::Good, 1440),
            );
        }
        let pipeline = StationPipeline::new(&Station::new("TSKT"), &DetectorConfig::default()).unwrap();
        let result = pipeline.run(&source, &source, day(0), day(0));
        assert_eq!(result.smoothed.len(), 1);
        assert_eq!(result.smoothed[0].day, day(0));
        assert_eq!(result.summary.days_with_data, 1);
    }
}
