use std::fmt;

use serde::{Deserialize, Serialize};

/// Price box produced by a detector. `top >= bottom` and `start <= end` always hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub top: f64,
    pub bottom: f64,
    /// Unix seconds of the first candle in the zone
    pub start: i64,
    /// Unix seconds of the last candle in the zone
    pub end: i64,
    pub status: ZoneStatus,
    pub is_active: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub zone_type: Option<ZoneType>,
}

impl Zone {
    /// Build a zone, ordering the bounds so the invariants hold for any input.
    pub fn new(a: f64, b: f64, start: i64, end: i64, status: ZoneStatus) -> Self {
        Self {
            top: a.max(b),
            bottom: a.min(b),
            start: start.min(end),
            end: start.max(end),
            status,
            is_active: status == ZoneStatus::Active,
            zone_type: None,
        }
    }

    pub fn with_type(mut self, zone_type: ZoneType) -> Self {
        self.zone_type = Some(zone_type);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    /// Zone is live: price has not left it (accumulation) or not yet revisited it
    Active,
    /// Impulsive breakout out of an accumulation box
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Demand,
    Supply,
}

/// Sentinel outcome when a detector has no zone to report.
///
/// Each variant is a distinct condition callers can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Scanned, nothing qualified
    Looking,
    /// Weekend market halt, no scan performed
    Weekend,
    /// Not enough candles to run the scan
    InsufficientData,
    /// Outside every trading session
    #[serde(rename = "none")]
    OutOfSession,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Looking => "looking",
            ScanStatus::Weekend => "weekend",
            ScanStatus::InsufficientData => "insufficient_data",
            ScanStatus::OutOfSession => "none",
        }
    }
}

/// Detector names as they appear in configuration, dedup keys and the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Accumulation,
    SupplyDemand,
    Fvg,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Accumulation => "accumulation",
            DetectorKind::SupplyDemand => "supply_demand",
            DetectorKind::Fvg => "fvg",
        }
    }

    /// Detectors that report several independently alerted zones per cycle
    pub fn is_multi_zone(&self) -> bool {
        !matches!(self, DetectorKind::Accumulation)
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_new_orders_bounds() {
        let zone = Zone::new(99.0, 101.0, 600, 60, ZoneStatus::Active);
        assert_eq!(zone.top, 101.0);
        assert_eq!(zone.bottom, 99.0);
        assert_eq!((zone.start, zone.end), (60, 600));
        assert!(zone.is_active);
    }

    #[test]
    fn detector_kind_wire_name_matches_display() {
        for kind in [
            DetectorKind::Accumulation,
            DetectorKind::SupplyDemand,
            DetectorKind::Fvg,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.to_string());
        }
    }

    #[test]
    fn out_of_session_serializes_as_none() {
        let json = serde_json::to_string(&ScanStatus::OutOfSession).unwrap();
        assert_eq!(json, "\"none\"");
    }
}
