//! Synthetic station days for development and tests.
//!
//! Stands in for real preprocessed data when none is at hand. A day is
//! background noise cut into 20 to 50 segments, each with its own
//! log-normally drawn level, generated independently for the envelope and
//! the low-frequency channel so the two are uncorrelated. Injected events
//! add the same sinusoid to both channels (or its negation to the
//! low-frequency one), which drives the windowed correlation towards +1
//! (or -1) for their duration.
//!
//! Every day is built from a seeded RNG, so a given seed always reproduces
//! the same signals.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use std::f64::consts::PI;

use crate::ingest::quality::{QualityLabel, QualityLabels};
use crate::ingest::source::InMemorySource;
use crate::model::{samples_per_day, DailySignalPair, Result, SseError, SECONDS_PER_DAY};

/// Quality intervals per day written by [`SyntheticDay::labels`].
pub const LABEL_INTERVALS: usize = 1440;

/// A correlated burst added on top of the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectedEvent {
    /// Offset of the burst from midnight, seconds.
    pub start_s: f64,
    pub duration_s: f64,
    pub amplitude: f64,
    pub period_s: f64,
    /// Low-frequency channel carries the negated burst.
    pub anticorrelated: bool,
}

impl InjectedEvent {
    pub fn new(start_s: f64, duration_s: f64, amplitude: f64) -> Self {
        Self {
            start_s,
            duration_s,
            amplitude,
            period_s: 120.0,
            anticorrelated: false,
        }
    }

    pub fn anticorrelated(self) -> Self {
        Self {
            anticorrelated: true,
            ..self
        }
    }

    fn value_at(&self, t: f64) -> Option<f64> {
        let offset = t - self.start_s;
        if offset < 0.0 || offset >= self.duration_s {
            return None;
        }
        Some(self.amplitude * (2.0 * PI * offset / self.period_s).sin())
    }
}

/// Builder for one synthetic station day.
#[derive(Debug, Clone)]
pub struct SyntheticDay {
    seed: u64,
    dt_dec: f64,
    noise_level: f64,
    envelope_level: f64,
    low_freq_level: f64,
    events: Vec<InjectedEvent>,
}

impl SyntheticDay {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            dt_dec: 1.0,
            noise_level: 0.01,
            envelope_level: 1.0,
            low_freq_level: 0.0,
            events: Vec::new(),
        }
    }

    /// No background noise: both channels sit at their constant levels
    /// outside injected events.
    pub fn quiet(self) -> Self {
        self.with_noise_level(0.0)
    }

    pub fn with_noise_level(mut self, level: f64) -> Self {
        self.noise_level = level;
        self
    }

    pub fn with_sample_interval(mut self, dt_dec: f64) -> Self {
        self.dt_dec = dt_dec;
        self
    }

    pub fn with_event(mut self, event: InjectedEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn generate(&self) -> Result<DailySignalPair> {
        let n = samples_per_day(self.dt_dec);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut envelope = vec![self.envelope_level; n];
        let mut low_freq = vec![self.low_freq_level; n];
        if self.noise_level > 0.0 {
            add_segmented_noise(&mut envelope, self.noise_level, &mut rng)?;
            add_segmented_noise(&mut low_freq, self.noise_level, &mut rng)?;
        }

        for event in &self.events {
            for i in 0..n {
                if let Some(v) = event.value_at(i as f64 * self.dt_dec) {
                    envelope[i] += v;
                    low_freq[i] += if event.anticorrelated { -v } else { v };
                }
            }
        }
        Ok(DailySignalPair::new(envelope, low_freq))
    }

    /// All-good quality labels matching the generated day.
    pub fn labels(&self) -> QualityLabels {
        QualityLabels::uniform(QualityLabel::Good, LABEL_INTERVALS)
    }

    /// Generates the day and stores it with its labels.
    pub fn insert_into(&self, source: &mut InMemorySource, station: &str, day: NaiveDate) -> Result<()> {
        source.insert_day(station, day, self.generate()?, self.labels());
        Ok(())
    }
}

/// Adds zero-mean Gaussian noise whose level changes between 20 and 50
/// random segments. Each segment's level is `base * LogNormal(0, 1)`.
fn add_segmented_noise(values: &mut [f64], base: f64, rng: &mut StdRng) -> Result<()> {
    let n = values.len();
    if n == 0 {
        return Ok(());
    }
    let segments: usize = rng.gen_range(20..=50);
    let mut cuts: Vec<usize> = (1..segments).map(|_| rng.gen_range(0..n)).collect();
    cuts.push(0);
    cuts.push(n);
    cuts.sort_unstable();
    cuts.dedup();

    let spread = LogNormal::new(0.0, 1.0).map_err(|e| SseError::Config(format!("noise spread: {}", e)))?;
    for bounds in cuts.windows(2) {
        let level = base * spread.sample(rng);
        let noise = Normal::new(0.0, level)
            .map_err(|e| SseError::Config(format!("noise level {}: {}", level, e)))?;
        for v in &mut values[bounds[0]..bounds[1]] {
            *v += noise.sample(rng);
        }
    }
    Ok(())
}

/// Fills `source` with `days` consecutive synthetic days for `station`,
/// seeding each from `seed` and its day index.
pub fn populate(
    source: &mut InMemorySource,
    station: &str,
    first_day: NaiveDate,
    days: u32,
    template: &SyntheticDay,
) -> Result<()> {
    for (i, day) in first_day.iter_days().take(days as usize).enumerate() {
        let day_builder = SyntheticDay {
            seed: template.seed.wrapping_add(i as u64),
            ..template.clone()
        };
        day_builder.insert_into(source, station, day)?;
    }
    Ok(())
}

/// Seconds from midnight for an `HH:MM` wall-clock offset.
pub fn hm(hours: u32, minutes: u32) -> f64 {
    (f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0).min(SECONDS_PER_DAY)
}
