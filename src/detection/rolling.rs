//! Rolling multi-day exceedance aggregation.
//!
//! Each day of the resolved timeline is cut into periods of
//! `interval_hours`. A period's exceedance mass sums, over its samples beyond
//! the day's threshold, how far each sample reaches past `k - 1` noise
//! scales: `max(0, |v| / std - k + 1)`. Masses go into a trailing window of
//! `window_days` per direction, and the window total converted to hours is
//! the activity trend for that period.
//!
//! Days without any data still contribute zero-mass periods, so the trend
//! has one point per period across the whole analysed range.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::RollingConfig;
use crate::detection::polarity::ResolvedTimeline;
use crate::detection::thresholds::DailyThreshold;
use crate::logging::{self, Stage};
use crate::model::{Direction, SmoothedSeries, TrendPoint};

// ---------------------------------------------------------------------------
// Period masses
// ---------------------------------------------------------------------------

/// Exceedance of one sample against its noise scale. A zero scale
/// contributes nothing.
pub fn exceedance(value: f64, std: f64, k: f64) -> f64 {
    if std == 0.0 {
        return 0.0;
    }
    (value.abs() / std - k + 1.0).max(0.0)
}

/// Exceedance masses of one aggregation period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodMass {
    pub timestamp: DateTime<Utc>,
    pub neg: f64,
    pub pos: f64,
    /// Samples in the period, valid or not.
    pub samples: usize,
}

impl PeriodMass {
    pub fn for_direction(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Positive => self.pos,
            Direction::Negative => self.neg,
        }
    }
}

/// Splits one smoothed day into periods and computes their masses.
pub fn period_masses(
    series: &SmoothedSeries,
    threshold: &DailyThreshold,
    interval_hours: u32,
    k: f64,
) -> Vec<PeriodMass> {
    let block = ((interval_hours as f64 * 3600.0 / series.dt_cc).round() as usize).max(1);
    series
        .samples
        .chunks(block)
        .enumerate()
        .map(|(p, chunk)| {
            let mut mass = PeriodMass {
                timestamp: series.timestamp(p * block),
                neg: 0.0,
                pos: 0.0,
                samples: chunk.len(),
            };
            for v in chunk.iter().filter_map(|s| s.value()) {
                if threshold.thresholds.exceeded_by(v, Direction::Negative) {
                    mass.neg += exceedance(v, threshold.std.neg, k);
                } else if threshold.thresholds.exceeded_by(v, Direction::Positive) {
                    mass.pos += exceedance(v, threshold.std.pos, k);
                }
            }
            mass
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Trailing window
// ---------------------------------------------------------------------------

/// Trailing-window sum of period masses for one station and direction.
///
/// An entry stays while `now - timestamp <= window`. The total is recomputed
/// from the retained entries after every eviction.
#[derive(Debug, Clone)]
pub struct RollingExceedance {
    window: Duration,
    entries: VecDeque<(DateTime<Utc>, f64, usize)>,
    total: f64,
}

impl RollingExceedance {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
            total: 0.0,
        }
    }

    pub fn with_days(days: u32) -> Self {
        Self::new(Duration::days(days as i64))
    }

    /// Adds a period and returns the window total as of its timestamp.
    pub fn push(&mut self, timestamp: DateTime<Utc>, mass: f64, samples: usize) -> f64 {
        self.entries.push_back((timestamp, mass, samples));
        self.evict_before(timestamp);
        self.total
    }

    fn evict_before(&mut self, now: DateTime<Utc>) {
        while let Some(&(t, _, _)) = self.entries.front() {
            if now - t > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.recalculate();
    }

    fn recalculate(&mut self) {
        self.total = self.entries.iter().map(|&(_, m, _)| m).sum();
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Samples behind the retained entries.
    pub fn samples(&self) -> usize {
        self.entries.iter().map(|&(_, _, n)| n).sum()
    }
}

// ---------------------------------------------------------------------------
// Trend series
// ---------------------------------------------------------------------------

/// A contiguous stretch of trend points above the series mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excursion {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub peak: f64,
    pub peak_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub station: String,
    pub direction: Direction,
    pub points: Vec<TrendPoint>,
}

impl TrendSeries {
    pub fn new(station: &str, direction: Direction) -> Self {
        Self {
            station: station.to_string(),
            direction,
            points: Vec::new(),
        }
    }

    /// Mean accumulated hours, `None` for an empty series.
    pub fn mean(&self) -> Option<f64> {
        let values: Vec<f64> = self.points.iter().map(|p| p.accumulated_hours).collect();
        crate::stats::mean(&values)
    }

    /// Groups points above the mean into episodes. Consecutive qualifying
    /// points no more than `proximity` apart belong to the same episode.
    pub fn excursions(&self, proximity: Duration) -> Vec<Excursion> {
        let Some(mean) = self.mean() else {
            return Vec::new();
        };
        let mut out: Vec<Excursion> = Vec::new();
        let mut previous: Option<DateTime<Utc>> = None;

        for p in self.points.iter().filter(|p| p.accumulated_hours > mean) {
            let joins = previous.is_some_and(|t| p.timestamp - t <= proximity);
            previous = Some(p.timestamp);
            if let Some(current) = out.last_mut().filter(|_| joins) {
                current.end = p.timestamp;
                if p.accumulated_hours > current.peak {
                    current.peak = p.accumulated_hours;
                    current.peak_time = p.timestamp;
                }
                continue;
            }
            out.push(Excursion {
                start: p.timestamp,
                end: p.timestamp,
                peak: p.accumulated_hours,
                peak_time: p.timestamp,
            });
        }
        out
    }
}

/// Trend series of one station, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingTrends {
    pub positive: TrendSeries,
    pub negative: TrendSeries,
}

/// Runs the aggregator over a resolved station timeline.
pub fn aggregate(
    station: &str,
    timeline: &ResolvedTimeline,
    cfg: &RollingConfig,
    k: f64,
) -> RollingTrends {
    let mut trends = RollingTrends {
        positive: TrendSeries::new(station, Direction::Positive),
        negative: TrendSeries::new(station, Direction::Negative),
    };
    let mut windows = [
        (Direction::Positive, RollingExceedance::with_days(cfg.window_days)),
        (Direction::Negative, RollingExceedance::with_days(cfg.window_days)),
    ];

    for (series, threshold) in timeline.series.iter().zip(&timeline.history) {
        let to_hours = series.dt_cc / 3600.0;
        let masses = period_masses(series, threshold, cfg.interval_hours, k);
        logging::debug(
            Stage::Rolling,
            Some(station),
            &format!(
                "{}: {} of {} periods carry mass",
                series.day,
                masses.iter().filter(|m| m.neg > 0.0 || m.pos > 0.0).count(),
                masses.len()
            ),
        );
        for period in masses {
            for (direction, window) in windows.iter_mut() {
                let mass = period.for_direction(*direction);
                let total = window.push(period.timestamp, mass, period.samples);
                let point = TrendPoint {
                    timestamp: period.timestamp,
                    direction: *direction,
                    accumulated_hours: total * to_hours,
                    mass,
                    samples: period.samples,
                };
                match direction {
                    Direction::Positive => trends.positive.points.push(point),
                    Direction::Negative => trends.negative.points.push(point),
                }
            }
        }
    }
    trends
}

// ---------------------------------------------------------------------------
// Multi-band combination
// ---------------------------------------------------------------------------

/// Merges trend series computed from different frequency bands.
///
/// Per timestamp the result keeps the largest `weight * accumulated_hours`
/// across bands; a band without that timestamp counts as zero. Station and
/// direction are taken from the first band. `None` when `bands` is empty.
pub fn combine_bands(bands: &[(f64, &TrendSeries)]) -> Option<TrendSeries> {
    let (_, first) = bands.first()?;
    let mut merged: BTreeMap<DateTime<Utc>, TrendPoint> = BTreeMap::new();

    for (weight, band) in bands {
        for p in &band.points {
            let weighted = TrendPoint {
                accumulated_hours: weight * p.accumulated_hours,
                ..p.clone()
            };
            let slot = merged.entry(p.timestamp).or_insert_with(|| TrendPoint {
                accumulated_hours: 0.0,
                mass: 0.0,
                samples: 0,
                ..weighted.clone()
            });
            if weighted.accumulated_hours > slot.accumulated_hours {
                *slot = weighted;
            }
        }
    }

    Some(TrendSeries {
        station: first.station.clone(),
        direction: first.direction,
        points: merged.into_values().collect(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
