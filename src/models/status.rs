use serde::Serialize;
use utoipa::ToSchema;

use crate::business_logic::registry::DetectorResult;
use crate::models::zone::DetectorKind;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DetectorStatus {
    #[schema(value_type = String, example = "accumulation")]
    pub detector: DetectorKind,
    /// looking, active, confirmed, misaligned, weekend, insufficient_data or none
    pub status: String,
    /// Full detector payload as published this cycle
    #[schema(value_type = Object)]
    pub result: serde_json::Value,
}

impl DetectorStatus {
    pub fn new(detector: DetectorKind, result: &DetectorResult) -> Self {
        Self {
            detector,
            status: result.status_label().to_string(),
            result: serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InstrumentStatus {
    pub instrument: String,
    pub ticker: String,
    pub label: String,
    pub interval: String,
    pub detectors: Vec<DetectorStatus>,
    /// Set when the last cycle could not fetch candles
    pub last_error: Option<String>,
    pub updated_at_ms: u64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ZonesResponse {
    pub instruments: Vec<InstrumentStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ZonesSnapshot {
    pub as_of_ms: u64,
    pub instruments: Vec<InstrumentStatus>,
}
