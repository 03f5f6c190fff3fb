//! Hysteresis event segmentation.
//!
//! The resolved smoothed series is walked sample by sample, across day
//! boundaries, against the thresholds of each sample's day. A run of samples
//! beyond the threshold opens an event; the first sample that is not beyond
//! it closes the event as `[start, end)`. Absent samples never exceed.
//!
//! A closed run becomes a [`DetectionEvent`] only when the mean coverage of
//! its samples reaches `min_event_coverage`. A run still open when the
//! timeline ends is dropped unless `close_open_events` is set, in which case
//! it is closed one sample interval after its last sample.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;

use crate::config::SegmentationConfig;
use crate::detection::polarity::ResolvedTimeline;
use crate::ingest::quality::{QualityLabel, QualityLabels};
use crate::model::{day_start, DetectionEvent, Direction, SECONDS_PER_DAY};
use crate::stats;

/// Events of one direction plus what was discarded along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    pub events: Vec<DetectionEvent>,
    /// Closed runs rejected for low mean coverage.
    pub rejected: usize,
    /// Start of a run left open at the end of the timeline and dropped.
    pub dropped_open: Option<DateTime<Utc>>,
}

struct RunSample {
    time: DateTime<Utc>,
    coverage: f64,
    value: f64,
}

/// Segments one direction of a resolved station timeline.
pub fn segment(
    station: &str,
    timeline: &ResolvedTimeline,
    direction: Direction,
    cfg: &SegmentationConfig,
) -> Segmentation {
    let mut out = Segmentation::default();
    let mut run: Vec<RunSample> = Vec::new();
    let mut last_step = None;

    for (series, threshold) in timeline.series.iter().zip(&timeline.history) {
        for (i, sample) in series.samples.iter().enumerate() {
            let time = series.timestamp(i);
            let coverage = series.coverage_s.get(i).copied().unwrap_or(0.0);
            let exceeding = sample
                .value()
                .is_some_and(|v| threshold.thresholds.exceeded_by(v, direction));

            if exceeding {
                run.push(RunSample {
                    time,
                    coverage,
                    value: sample.or_zero(),
                });
            } else if !run.is_empty() {
                close_run(station, direction, &run, time, coverage, cfg, &mut out);
                run.clear();
            }
            last_step = Some(series.dt_cc);
        }
    }

    if let (Some(last), Some(first)) = (run.last(), run.first()) {
        if cfg.close_open_events {
            let dt = last_step.unwrap_or(0.0);
            let end = last.time + Duration::milliseconds((dt * 1000.0).round() as i64);
            close_run(station, direction, &run, end, last.coverage, cfg, &mut out);
        } else {
            out.dropped_open = Some(first.time);
        }
    }
    out
}

/// Both directions, merged and ordered by start time.
pub fn segment_all(
    station: &str,
    timeline: &ResolvedTimeline,
    cfg: &SegmentationConfig,
) -> (Vec<DetectionEvent>, Vec<(Direction, Segmentation)>) {
    let per_direction: Vec<(Direction, Segmentation)> = Direction::all()
        .into_iter()
        .map(|d| (d, segment(station, timeline, d, cfg)))
        .collect();
    let mut events: Vec<DetectionEvent> = per_direction
        .iter()
        .flat_map(|(_, s)| s.events.iter().cloned())
        .collect();
    events.sort_by_key(|e| e.start);
    (events, per_direction)
}

fn close_run(
    station: &str,
    direction: Direction,
    run: &[RunSample],
    end: DateTime<Utc>,
    coverage_end: f64,
    cfg: &SegmentationConfig,
    out: &mut Segmentation,
) {
    let coverage: Vec<f64> = run.iter().map(|s| s.coverage).collect();
    let mean = stats::mean(&coverage).unwrap_or(0.0);
    if mean < cfg.min_event_coverage {
        out.rejected += 1;
        return;
    }

    let start = run[0].time;
    let offsets: Vec<f64> = run
        .iter()
        .map(|s| (s.time - start).num_milliseconds() as f64 / 1000.0)
        .collect();
    let weighted_offset = stats::weighted_mean(&offsets, &coverage).unwrap_or(0.0);

    let values = run.iter().map(|s| s.value);
    let peak = match direction {
        Direction::Positive => values.fold(f64::NEG_INFINITY, f64::max),
        Direction::Negative => values.fold(f64::INFINITY, f64::min),
    };

    out.events.push(DetectionEvent {
        station: station.to_string(),
        direction,
        start,
        end,
        weighted_time: start + Duration::milliseconds((weighted_offset * 1000.0).round() as i64),
        coverage_mean: mean,
        coverage_std: stats::population_std(&coverage).unwrap_or(0.0),
        coverage_start: run[0].coverage,
        coverage_q1: stats::percentile(&coverage, 25.0).unwrap_or(0.0),
        coverage_median: stats::percentile(&coverage, 50.0).unwrap_or(0.0),
        coverage_q3: stats::percentile(&coverage, 75.0).unwrap_or(0.0),
        coverage_end,
        peak,
    });
}

// ---------------------------------------------------------------------------
// Quality screening
// ---------------------------------------------------------------------------

/// Keeps only events whose whole span carries the accepted label.
///
/// An event touching a day without labels is dropped.
pub fn screen_events(
    events: &[DetectionEvent],
    labels_by_day: &HashMap<NaiveDate, QualityLabels>,
    accepted: QualityLabel,
) -> Vec<DetectionEvent> {
    events
        .iter()
        .filter(|e| span_accepted(e, labels_by_day, accepted))
        .cloned()
        .collect()
}

fn span_accepted(
    event: &DetectionEvent,
    labels_by_day: &HashMap<NaiveDate, QualityLabels>,
    accepted: QualityLabel,
) -> bool {
    let last_instant = event.end - Duration::milliseconds(1);
    let mut day = event.start.date_naive();
    while day <= last_instant.date_naive() {
        let Some(labels) = labels_by_day.get(&day) else {
            return false;
        };
        let midnight = day_start(day);
        let from_s = (event.start.max(midnight) - midnight).num_milliseconds() as f64 / 1000.0;
        let to_s = ((last_instant - midnight).num_milliseconds() as f64 / 1000.0)
            .min(SECONDS_PER_DAY);
        if !labels.all_accepted(from_s, to_s, accepted) {
            return false;
        }
        day = day + Duration::days(1);
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
