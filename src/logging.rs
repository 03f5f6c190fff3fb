//! Structured logging for the detection pipeline.
//!
//! Every line carries the pipeline stage (used as the `log` target) and,
//! when relevant, the station code. The backend is `env_logger`; output goes
//! to stderr or, for batch runs, appends to a log file.

use chrono::{NaiveDate, Utc};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;

use crate::model::{SseError, StationSummary};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }

    fn as_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }

    /// Parses "debug", "info", "warn"/"warning" or "error" (any case).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Correlation,
    Smoothing,
    Threshold,
    Segmentation,
    Rolling,
    Pipeline,
}

impl Stage {
    /// `log` target for this stage.
    pub fn target(&self) -> &'static str {
        match self {
            Stage::Ingest => "sse::ingest",
            Stage::Correlation => "sse::cc",
            Stage::Smoothing => "sse::ccma",
            Stage::Threshold => "sse::std",
            Stage::Segmentation => "sse::detect",
            Stage::Rolling => "sse::rolling",
            Stage::Pipeline => "sse::pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "INGEST",
            Stage::Correlation => "CC",
            Stage::Smoothing => "CCMA",
            Stage::Threshold => "STD",
            Stage::Segmentation => "DETECT",
            Stage::Rolling => "ROLL",
            Stage::Pipeline => "PIPE",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Station offline or day not delivered; routine.
    Expected,
    /// Delivered data is malformed; points at an upstream fault.
    Unexpected,
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify_failure(err: &SseError) -> FailureType {
    match err {
        SseError::MissingDay { .. } => FailureType::Expected,
        SseError::ShapeMismatch { .. } => FailureType::Unexpected,
        SseError::Config(_) | SseError::UnknownStation(_) => FailureType::Unexpected,
        _ => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Installs the global logger.
///
/// With `log_file` set, lines are appended to that file instead of stderr.
/// Calling this more than once keeps the first logger.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, timestamps: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(min_level.as_filter());
    builder.format(move |buf, record| {
        if timestamps {
            writeln!(
                buf,
                "{} {} {}: {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(buf, "{} {}: {}", record.level(), record.target(), record.args())
        }
    });

    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Failed to open log file {}: {}", path, e),
        }
    }

    let _ = builder.try_init();
}

/// Logger settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub file: Option<String>,
}

impl LogSettings {
    /// Reads `SSE_LOG_LEVEL` (default info; unparseable values fall back to
    /// info) and `SSE_LOG_FILE` after loading `.env`.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let level = std::env::var("SSE_LOG_LEVEL")
            .ok()
            .and_then(|l| LogLevel::parse(&l))
            .unwrap_or(LogLevel::Info);
        let file = std::env::var("SSE_LOG_FILE").ok().filter(|f| !f.trim().is_empty());
        LogSettings { level, file }
    }
}

/// Installs the logger from [`LogSettings::from_env`] with timestamps.
pub fn init_from_env() -> LogSettings {
    let settings = LogSettings::from_env();
    init_logger(settings.level, settings.file.as_deref(), true);
    settings
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

fn emit(level: LogLevel, stage: Stage, station: Option<&str>, message: &str) {
    match station {
        Some(code) => log::log!(target: stage.target(), level.as_level(), "[{}] {}", code, message),
        None => log::log!(target: stage.target(), level.as_level(), "{}", message),
    }
}

pub fn info(stage: Stage, station: Option<&str>, message: &str) {
    emit(LogLevel::Info, stage, station, message);
}

pub fn warn(stage: Stage, station: Option<&str>, message: &str) {
    emit(LogLevel::Warning, stage, station, message);
}

pub fn error(stage: Stage, station: Option<&str>, message: &str) {
    emit(LogLevel::Error, stage, station, message);
}

pub fn debug(stage: Stage, station: Option<&str>, message: &str) {
    emit(LogLevel::Debug, stage, station, message);
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Logs a recovered per-day failure. Missing days are routine and logged at
/// debug, malformed days are warnings and anything else is an error.
pub fn log_day_failure(stage: Stage, station: &str, day: NaiveDate, err: &SseError) {
    let failure_type = classify_failure(err);
    let message = format!("{} skipped [{}]: {}", day, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(stage, Some(station), &message),
        FailureType::Unexpected => warn(stage, Some(station), &message),
        FailureType::Unknown => error(stage, Some(station), &message),
    }
}

// ---------------------------------------------------------------------------
// Summary Logging
// ---------------------------------------------------------------------------

pub fn log_station_summary(summary: &StationSummary) {
    let message = format!(
        "{}..{}: {}/{} days usable, {} detections ({} negative), {:.1} h detected, \
         std neg={:.4} pos={:.4}, inverted={}",
        summary.start_day,
        summary.end_day,
        summary.days_with_data,
        summary.days_processed,
        summary.detections,
        summary.negative_detections,
        summary.detected_seconds / 3600.0,
        summary.global_std.neg,
        summary.global_std.pos,
        summary.sign_inverted
    );

    if summary.days_with_data == 0 {
        warn(Stage::Pipeline, Some(&summary.station), &message);
    } else {
        info(Stage::Pipeline, Some(&summary.station), &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_failure_classification() {
        let day = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        let missing = SseError::MissingDay { station: "RIOS".into(), day };
        assert_eq!(classify_failure(&missing), FailureType::Expected);

        let mismatch = SseError::ShapeMismatch {
            station: "RIOS".into(),
            day,
            detail: "envelope has 86000 samples".into(),
        };
        assert_eq!(classify_failure(&mismatch), FailureType::Unexpected);
    }

    #[test]
    fn test_stage_targets_are_distinct() {
        let stages = [
            Stage::Ingest,
            Stage::Correlation,
            Stage::Smoothing,
            Stage::Threshold,
            Stage::Segmentation,
            Stage::Rolling,
            Stage::Pipeline,
        ];
        let targets: std::collections::HashSet<_> = stages.iter().map(|s| s.target()).collect();
        assert_eq!(targets.len(), stages.len());
    }
}
