//! Run report
//!
//! Collects the per-station outcomes of a network run into one serialisable
//! document: status per station, detected events, rolling-trend episodes and
//! network totals. Written as JSON for downstream tools and echoed through
//! the logging layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::TrendConfig;
use crate::detection::rolling::Excursion;
use crate::logging::{self, Stage};
use crate::model::{DetectionEvent, Result, StationSummary};
use crate::pipeline::StationResult;

// ============================================================================
// Report types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    /// At least one positive event in the range.
    Detected,
    /// Usable data, nothing detected.
    Quiet,
    /// No day delivered usable signals.
    NoData,
}

impl StationStatus {
    pub fn from_summary(summary: &StationSummary) -> Self {
        if summary.days_with_data == 0 {
            StationStatus::NoData
        } else if summary.detections > 0 {
            StationStatus::Detected
        } else {
            StationStatus::Quiet
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationReport {
    pub status: StationStatus,
    pub summary: StationSummary,
    pub events: Vec<DetectionEvent>,
    /// Mean accumulated hours of the positive trend.
    pub trend_mean_hours: Option<f64>,
    /// Above-mean episodes of the positive trend.
    pub episodes: Vec<Excursion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stations_total: usize,
    pub stations_detected: usize,
    pub stations_quiet: usize,
    pub stations_no_data: usize,
    pub events_total: usize,
    pub detected_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub stations: Vec<StationReport>,
    pub summary: RunSummary,
}

// ============================================================================
// Construction
// ============================================================================

impl RunReport {
    pub fn from_results(
        results: &[StationResult],
        trend: &TrendConfig,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let proximity = Duration::hours(i64::from(trend.proximity_hours));
        let stations: Vec<StationReport> = results
            .iter()
            .map(|r| StationReport {
                status: StationStatus::from_summary(&r.summary),
                summary: r.summary.clone(),
                events: r.positive_events().cloned().collect(),
                trend_mean_hours: r.trends.positive.mean(),
                episodes: r.trends.positive.excursions(proximity),
            })
            .collect();

        let mut summary = RunSummary {
            stations_total: stations.len(),
            ..Default::default()
        };
        for s in &stations {
            match s.status {
                StationStatus::Detected => summary.stations_detected += 1,
                StationStatus::Quiet => summary.stations_quiet += 1,
                StationStatus::NoData => summary.stations_no_data += 1,
            }
            summary.events_total += s.events.len();
            summary.detected_hours += s.summary.detected_seconds / 3600.0;
        }

        RunReport {
            generated_at,
            stations,
            summary,
        }
    }

    pub fn station(&self, code: &str) -> Option<&StationReport> {
        self.stations.iter().find(|s| s.summary.station == code)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Emits the network totals and one line per station with detections.
pub fn log_summary(report: &RunReport) {
    let s = &report.summary;
    logging::info(
        Stage::Pipeline,
        None,
        &format!(
            "run complete: {} stations ({} detected, {} quiet, {} without data), {} events, {:.1} h",
            s.stations_total,
            s.stations_detected,
            s.stations_quiet,
            s.stations_no_data,
            s.events_total,
            s.detected_hours
        ),
    );

    for station in &report.stations {
        match station.status {
            StationStatus::Detected => {
                let strongest = station
                    .events
                    .iter()
                    .map(|e| e.peak)
                    .fold(f64::NEG_INFINITY, f64::max);
                logging::info(
                    Stage::Pipeline,
                    Some(&station.summary.station),
                    &format!(
                        "{} events, strongest peak {:.3}, {} trend episodes",
                        station.events.len(),
                        strongest,
                        station.episodes.len()
                    ),
                );
            }
            StationStatus::NoData => logging::warn(
                Stage::Pipeline,
                Some(&station.summary.station),
                "no usable data in range",
            ),
            StationStatus::Quiet => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
