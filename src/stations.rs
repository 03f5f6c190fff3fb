//! Station registry for the slow-slip detector.
//!
//! A station is an identifier plus optional overrides of the stage
//! parameters: correlation window, minimum accepted seconds, output interval,
//! moving-average window and minimum smoothed coverage. Stations are loaded
//! from a TOML list; `reference_network()` returns the built-in network the
//! default parameters were tuned on.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::config::DetectorConfig;
use crate::model::{Result, SseError};

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// One monitoring station and its parameter overrides.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Station {
    /// Short uppercase station code, e.g. "RIOS".
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Correlation window override, seconds.
    #[serde(default)]
    pub twin: Option<f64>,
    /// Minimum accepted-quality seconds per correlation window.
    #[serde(default)]
    pub min_twin: Option<f64>,
    /// Correlation output interval override, seconds.
    #[serde(default)]
    pub dt_cc: Option<f64>,
    /// Moving-average window override, seconds.
    #[serde(default)]
    pub twin_mvave: Option<f64>,
    /// Minimum smoothed coverage override, seconds.
    #[serde(default)]
    pub min_data: Option<f64>,
}

impl Station {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Default::default()
        }
    }

    /// The network-wide configuration with this station's overrides applied.
    pub fn effective_config(&self, base: &DetectorConfig) -> DetectorConfig {
        let mut config = base.clone();
        if let Some(twin) = self.twin {
            config.correlation.twin = twin;
        }
        if let Some(min_twin) = self.min_twin {
            config.correlation.min_twin = min_twin;
        }
        if let Some(dt_cc) = self.dt_cc {
            config.correlation.dt_cc = dt_cc;
        }
        if let Some(twin_mvave) = self.twin_mvave {
            config.smoothing.twin_mvave = twin_mvave;
        }
        if let Some(min_data) = self.min_data {
            config.smoothing.min_data = min_data;
        }
        config
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }
}

#[derive(Debug, Deserialize)]
struct StationFile {
    #[serde(default)]
    station: Vec<Station>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a `[[station]]` list and checks every code.
pub fn parse_stations(text: &str) -> Result<Vec<Station>> {
    let file: StationFile = toml::from_str(text)?;
    validate_codes(&file.station)?;
    Ok(file.station)
}

/// Reads a station list from disk.
pub fn load_stations<P: AsRef<Path>>(path: P) -> Result<Vec<Station>> {
    let text = std::fs::read_to_string(path)?;
    parse_stations(&text)
}

fn validate_codes(stations: &[Station]) -> Result<()> {
    let mut seen = HashSet::new();
    for station in stations {
        if !is_valid_code(&station.code) {
            return Err(SseError::Config(format!(
                "station code '{}' must be non-empty uppercase alphanumeric",
                station.code
            )));
        }
        if !seen.insert(station.code.as_str()) {
            return Err(SseError::Config(format!(
                "duplicate station code '{}'",
                station.code
            )));
        }
    }
    Ok(())
}

/// Station codes are short uppercase alphanumeric identifiers.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Looks up a station by code.
pub fn find_station<'a>(stations: &'a [Station], code: &str) -> Result<&'a Station> {
    stations
        .iter()
        .find(|s| s.code == code)
        .ok_or_else(|| SseError::UnknownStation(code.to_string()))
}

/// The four-station network the default parameters were tuned on.
/// PJIM uses a longer correlation window.
pub fn reference_network() -> Vec<Station> {
    vec![
        Station::new("RIOS"),
        Station::new("CCOL"),
        Station {
            twin: Some(360.0),
            ..Station::new("PJIM")
        },
        Station::new("TSKT"),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_network_codes_are_valid_and_unique() {
        let network = reference_network();
        validate_codes(&network).expect("reference network must validate");
        assert_eq!(network.len(), 4);
    }

    #[test]
    fn test_parse_station_list_with_overrides() {
        let stations = parse_stations(
            r#"
            [[station]]
            code = "RIOS"
            name = "Rios"

            [[station]]
            code = "PJIM"
            twin = 360.0
            min_data = 1800.0
            "#,
        )
        .expect("station list should parse");
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].display_name(), "Rios");
        assert_eq!(stations[1].display_name(), "PJIM");
        assert_eq!(stations[1].twin, Some(360.0));
    }

    #[test]
    fn test_effective_config_applies_only_given_overrides() {
        let base = DetectorConfig::default();
        let station = Station {
            twin: Some(360.0),
            min_data: Some(1800.0),
            ..Station::new("PJIM")
        };
        let config = station.effective_config(&base);
        assert_eq!(config.correlation.twin, 360.0);
        assert_eq!(config.smoothing.min_data, 1800.0);
        assert_eq!(config.correlation.dt_cc, base.correlation.dt_cc);
        assert_eq!(config.smoothing.twin_mvave, base.smoothing.twin_mvave);
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let err = parse_stations("[[station]]\ncode = \"RIOS\"\n[[station]]\ncode = \"RIOS\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {}", err);
    }

    #[test]
    fn test_lowercase_code_rejected() {
        assert!(!is_valid_code("rios"));
        assert!(!is_valid_code(""));
        assert!(is_valid_code("TSKT"));
        assert!(parse_stations("[[station]]\ncode = \"ri-os\"\n").is_err());
    }

    #[test]
    fn test_find_station_rejects_unknown_code() {
        let network = reference_network();
        assert_eq!(find_station(&network, "PJIM").map(|s| s.code.as_str()).ok(), Some("PJIM"));
        match find_station(&network, "XXXX") {
            Err(SseError::UnknownStation(code)) => assert_eq!(code, "XXXX"),
            other => panic!("expected an unknown-station error, got {:?}", other),
        }
    }
}
