use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::business_logic::lifecycle::ALERT_TTL_SECS;
use crate::business_logic::session::{Session, SessionLimits};
use crate::errors::ConfigError;
use crate::models::interval::{validate_interval, validate_period};

/// Configuration parameters for accumulation detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
#[validate(schema(function = "validate_accumulation_windows"))]
pub struct AccumulationConfig {
    /// Largest window size scanned, in candles
    #[validate(range(min = 3))]
    pub lookback: usize,
    /// Smallest window size scanned, in candles
    #[validate(range(min = 3))]
    pub min_candles: usize,
    /// Slope scaling factor per instrument
    #[validate(range(exclusive_min = 0.0))]
    pub threshold_pct: f64,
    /// Max ADX allowed inside a box
    #[validate(range(min = 0.0, max = 100.0))]
    pub adx_threshold: f64,
    /// Fallback max box height (fraction of price) when no session override is set
    pub max_range_pct: Option<f64>,
    pub asian_range_pct: Option<f64>,
    pub london_range_pct: Option<f64>,
    pub new_york_range_pct: Option<f64>,
}

impl Default for AccumulationConfig {
    fn default() -> Self {
        Self {
            lookback: 40,
            min_candles: 20,
            threshold_pct: 0.003,
            adx_threshold: 25.0,
            max_range_pct: None,
            asian_range_pct: None,
            london_range_pct: None,
            new_york_range_pct: None,
        }
    }
}

impl SessionLimits for AccumulationConfig {
    fn session_range_pct(&self, session: Session) -> Option<f64> {
        match session {
            Session::Asian => self.asian_range_pct,
            Session::London => self.london_range_pct,
            Session::NewYork => self.new_york_range_pct,
            Session::None => None,
        }
    }

    fn max_range_pct(&self) -> Option<f64> {
        self.max_range_pct
    }
}

fn validate_accumulation_windows(config: &AccumulationConfig) -> Result<(), ValidationError> {
    if config.lookback < config.min_candles {
        let mut error = ValidationError::new("lookback_below_min_candles");
        error.message = Some("lookback must be >= min_candles".into());
        return Err(error);
    }
    Ok(())
}

/// Configuration parameters for supply/demand zone detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SupplyDemandConfig {
    /// Impulse body must be at least this multiple of the series' average body
    #[validate(range(exclusive_min = 0.0))]
    pub impulse_multiplier: f64,
    /// Min wick share of an indecision candle's range
    #[validate(range(min = 0.0, max = 1.0))]
    pub wick_ratio: f64,
    #[validate(range(min = 1))]
    pub max_zones: usize,
    /// Candidates older than this stop the scan
    #[validate(range(min = 1, max = 365))]
    pub max_age_days: i64,
    /// Sessions an indecision candle may form in
    #[validate(length(min = 1))]
    pub valid_sessions: Vec<Session>,
    /// Interval/period for the daily bias candles
    #[validate(custom(function = "validate_interval"))]
    pub daily_interval: String,
    #[validate(custom(function = "validate_period"))]
    pub daily_period: String,
    /// Interval/period for the weekly bias candles
    #[validate(custom(function = "validate_interval"))]
    pub weekly_interval: String,
    #[validate(custom(function = "validate_period"))]
    pub weekly_period: String,
}

impl Default for SupplyDemandConfig {
    fn default() -> Self {
        Self {
            impulse_multiplier: 1.8,
            wick_ratio: 0.6,
            max_zones: 5,
            max_age_days: 3,
            valid_sessions: vec![Session::Asian, Session::London, Session::NewYork],
            daily_interval: "1d".to_string(),
            daily_period: "5d".to_string(),
            weekly_interval: "1w".to_string(),
            weekly_period: "3mo".to_string(),
        }
    }
}

/// Configuration parameters for fair-value-gap detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct FvgConfig {
    /// Closed candles scanned as the middle of a triple
    #[validate(range(min = 1))]
    pub lookback: usize,
    /// Min gap size as a fraction of the impulse candle's midpoint
    #[validate(range(min = 0.0))]
    pub min_gap_pct: f64,
    /// Min body share of the impulse candle's range
    #[validate(range(min = 0.0, max = 1.0))]
    pub impulse_body_pct: f64,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self {
            lookback: 80,
            min_gap_pct: 0.0001,
            impulse_body_pct: 0.60,
        }
    }
}

/// One explicit config per detector variant. Absent detectors are disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DetectorSet {
    #[validate(nested)]
    pub accumulation: Option<AccumulationConfig>,
    #[validate(nested)]
    pub supply_demand: Option<SupplyDemandConfig>,
    #[validate(nested)]
    pub fvg: Option<FvgConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    /// Display id, also used in dedup keys and file names (e.g. "BTC")
    #[validate(length(min = 1, max = 24), custom(function = "validate_instrument_id"))]
    pub id: String,
    /// Provider symbol
    #[validate(length(min = 1))]
    pub ticker: String,
    #[serde(default)]
    pub label: String,
    #[validate(custom(function = "validate_interval"))]
    pub interval: String,
    #[validate(custom(function = "validate_period"))]
    pub period: String,
    #[validate(nested)]
    pub detectors: DetectorSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub bind_addr: String,
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    /// Directory holding one dedup file per instrument and detector.
    /// `null` keeps alert records in memory only.
    pub dedup_dir: Option<String>,
    /// Alert records older than this are pruned
    #[validate(range(min = 1))]
    pub alert_ttl_secs: i64,
    pub webhook_url: Option<String>,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<String>,
    #[validate(length(min = 1), nested)]
    pub instruments: Vec<InstrumentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            poll_interval_secs: 30,
            dedup_dir: Some("data/alerts".to_string()),
            alert_ttl_secs: ALERT_TTL_SECS,
            webhook_url: None,
            log_dir: None,
            instruments: default_instruments(),
        }
    }
}

/// Ids end up in dedup file names, so only ASCII letters, digits, `-` and `_` are allowed
fn validate_instrument_id(id: &str) -> Result<(), ValidationError> {
    if id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Ok(());
    }
    let mut error = ValidationError::new("instrument_id");
    error.message = Some(format!("instrument id {id:?} may only hold letters, digits, '-' and '_'").into());
    Err(error)
}

impl AppConfig {
    /// Read and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(raw)?;
        config.validate()?;

        let mut seen = std::collections::HashSet::new();
        for instrument in &config.instruments {
            if !seen.insert(instrument.id.as_str()) {
                return Err(ConfigError::DuplicateInstrument(instrument.id.clone()));
            }
        }

        Ok(config)
    }
}

fn default_instruments() -> Vec<InstrumentConfig> {
    vec![
        InstrumentConfig {
            id: "BTC".to_string(),
            ticker: "BTC".to_string(),
            label: "Bitcoin perpetual".to_string(),
            interval: "1m".to_string(),
            period: "1d".to_string(),
            detectors: DetectorSet {
                accumulation: Some(AccumulationConfig {
                    lookback: 100,
                    asian_range_pct: Some(0.001),
                    london_range_pct: Some(0.002),
                    new_york_range_pct: Some(0.003),
                    ..AccumulationConfig::default()
                }),
                fvg: Some(FvgConfig::default()),
                ..DetectorSet::default()
            },
        },
        InstrumentConfig {
            id: "ETH".to_string(),
            ticker: "ETH".to_string(),
            label: "Ether perpetual".to_string(),
            interval: "1m".to_string(),
            period: "1d".to_string(),
            detectors: DetectorSet {
                accumulation: Some(AccumulationConfig {
                    lookback: 100,
                    threshold_pct: 0.002,
                    asian_range_pct: Some(0.0015),
                    london_range_pct: Some(0.002),
                    new_york_range_pct: Some(0.003),
                    ..AccumulationConfig::default()
                }),
                ..DetectorSet::default()
            },
        },
        InstrumentConfig {
            id: "SOL".to_string(),
            ticker: "SOL".to_string(),
            label: "Solana perpetual".to_string(),
            interval: "30m".to_string(),
            period: "5d".to_string(),
            detectors: DetectorSet {
                supply_demand: Some(SupplyDemandConfig {
                    valid_sessions: vec![Session::London, Session::NewYork],
                    ..SupplyDemandConfig::default()
                }),
                ..DetectorSet::default()
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.alert_ttl_secs, 14_400);
    }

    #[test]
    fn partial_detector_config_uses_defaults() {
        let raw = r#"{
            "instruments": [{
                "id": "US30",
                "ticker": "YM",
                "interval": "1m",
                "period": "1d",
                "detectors": { "accumulation": { "lookback": 100, "london_range_pct": 0.002 } }
            }]
        }"#;
        let config = AppConfig::from_json(raw).unwrap();
        let accumulation = config.instruments[0].detectors.accumulation.clone().unwrap();
        assert_eq!(accumulation.lookback, 100);
        assert_eq!(accumulation.min_candles, 20);
        assert_eq!(accumulation.london_range_pct, Some(0.002));
        assert!(config.instruments[0].detectors.supply_demand.is_none());
        assert!(config.instruments[0].detectors.fvg.is_none());
        assert_eq!(config.dedup_dir.as_deref(), Some("data/alerts"));
    }

    #[test]
    fn unknown_detector_name_is_rejected() {
        let raw = r#"{
            "instruments": [{
                "id": "US30", "ticker": "YM", "interval": "1m", "period": "1d",
                "detectors": { "orderblock": {} }
            }]
        }"#;
        assert!(matches!(AppConfig::from_json(raw), Err(ConfigError::Json(_))));
    }

    #[test]
    fn unknown_detector_key_is_rejected() {
        let raw = r#"{
            "instruments": [{
                "id": "US30", "ticker": "YM", "interval": "1m", "period": "1d",
                "detectors": { "fvg": { "min_gap": 0.1 } }
            }]
        }"#;
        assert!(matches!(AppConfig::from_json(raw), Err(ConfigError::Json(_))));
    }

    #[test]
    fn lookback_below_min_candles_fails_validation() {
        let raw = r#"{
            "instruments": [{
                "id": "US30", "ticker": "YM", "interval": "1m", "period": "1d",
                "detectors": { "accumulation": { "lookback": 10, "min_candles": 20 } }
            }]
        }"#;
        assert!(matches!(
            AppConfig::from_json(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn unsupported_interval_fails_validation() {
        let raw = r#"{
            "instruments": [{
                "id": "US30", "ticker": "YM", "interval": "10m", "period": "1d",
                "detectors": {}
            }]
        }"#;
        assert!(matches!(
            AppConfig::from_json(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn path_unsafe_instrument_id_fails_validation() {
        for id in ["EUR/USD", "../BTC", "BTC USD"] {
            let raw = format!(
                r#"{{ "instruments": [{{ "id": "{id}", "ticker": "X", "interval": "1m", "period": "1d", "detectors": {{}} }}] }}"#
            );
            assert!(
                matches!(AppConfig::from_json(&raw), Err(ConfigError::Validation(_))),
                "{id} was accepted"
            );
        }
    }

    #[test]
    fn oversized_max_age_fails_validation() {
        let raw = r#"{
            "instruments": [{
                "id": "SOL", "ticker": "SOL", "interval": "30m", "period": "5d",
                "detectors": { "supply_demand": { "max_age_days": 9223372036854775807 } }
            }]
        }"#;
        assert!(matches!(
            AppConfig::from_json(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn null_dedup_dir_means_memory_only() {
        let raw = r#"{
            "dedup_dir": null,
            "instruments": [{ "id": "US30", "ticker": "YM", "interval": "1m", "period": "1d", "detectors": {} }]
        }"#;
        assert_eq!(AppConfig::from_json(raw).unwrap().dedup_dir, None);
    }

    #[test]
    fn duplicate_instrument_ids_are_rejected() {
        let instrument = r#"{ "id": "US30", "ticker": "YM", "interval": "1m", "period": "1d", "detectors": {} }"#;
        let raw = format!(r#"{{ "instruments": [{instrument}, {instrument}] }}"#);
        assert!(matches!(
            AppConfig::from_json(&raw),
            Err(ConfigError::DuplicateInstrument(id)) if id == "US30"
        ));
    }
}
