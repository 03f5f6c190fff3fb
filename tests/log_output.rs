// Log lines written by a full network run, captured in a log file.
//
// The logger and environment are process-global, so this binary installs
// the logger exactly once.

use chrono::{Duration, NaiveDate, Utc};

use sse_detect::config::DetectorConfig;
use sse_detect::ingest::InMemorySource;
use sse_detect::logging::{init_from_env, log_day_failure, LogLevel, Stage};
use sse_detect::pipeline::run_network;
use sse_detect::report::{log_summary, RunReport};
use sse_detect::stations::Station;
use sse_detect::synthetic::{hm, InjectedEvent, SyntheticDay};
use sse_detect::SseError;

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 8, 15).unwrap() + Duration::days(offset)
}

#[test]
fn test_network_run_writes_stage_lines_to_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sse.log");
    unsafe {
        std::env::set_var("SSE_LOG_LEVEL", "debug");
        std::env::set_var("SSE_LOG_FILE", &path);
    }
    let settings = init_from_env();
    assert_eq!(settings.level, LogLevel::Debug);

    let mut source = InMemorySource::new();
    for d in [-1, 1] {
        SyntheticDay::new(d as u64).quiet().insert_into(&mut source, "RIOS", day(d)).unwrap();
    }
    SyntheticDay::new(0)
        .quiet()
        .with_event(InjectedEvent::new(hm(10, 0), 3600.0, 1.0))
        .insert_into(&mut source, "RIOS", day(0))
        .unwrap();

    let config = DetectorConfig::default();
    let broken = Station {
        twin_mvave: Some(-1.0),
        ..Station::new("CCOL")
    };
    let rejected = run_network(&[Station::new("RIOS"), broken], &source, &source, day(0), day(0), &config);
    assert!(matches!(rejected, Err(SseError::Config(_))));

    let results = run_network(&[Station::new("RIOS")], &source, &source, day(0), day(0), &config).unwrap();
    log_summary(&RunReport::from_results(&results, &config.trend, Utc::now()));

    let io = SseError::Io(std::io::Error::other("disk gone"));
    log_day_failure(Stage::Ingest, "TSKT", day(0), &io);

    let log = std::fs::read_to_string(&path).unwrap();
    let expected = [
        "ERROR sse::pipeline: [CCOL] rejected station config",
        "DEBUG sse::ccma: [RIOS] 2018-08-15:",
        "DEBUG sse::rolling: [RIOS] 2018-08-15:",
        "of 12 periods carry mass",
        "INFO sse::pipeline: run complete: 1 stations (1 detected",
        "INFO sse::pipeline: [RIOS] 1 events",
        "ERROR sse::ingest: [TSKT] 2018-08-15 skipped [UNKNOWN]",
    ];
    for line in expected {
        assert!(log.contains(line), "missing {:?} in log:\n{}", line, log);
    }
}
