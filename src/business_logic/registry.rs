use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::accumulation::{AccumulationDetector, AccumulationZone};
use crate::business_logic::config::{
    AccumulationConfig, DetectorSet, FvgConfig, SupplyDemandConfig,
};
use crate::business_logic::fvg::{FvgDetector, FvgScan};
use crate::business_logic::supply_demand::{
    Bias, BiasInput, SupplyDemandDetector, SupplyDemandScan,
};
use crate::models::candle::CandleSeries;
use crate::models::zone::{DetectorKind, ScanStatus, ZoneStatus};

/// Outcome of one detector run. Serialized without a tag so API clients see the bare payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectorResult {
    Sentinel { status: ScanStatus },
    Zone(Box<AccumulationZone>),
    SupplyDemand(SupplyDemandScan),
    Fvg(FvgScan),
}

impl DetectorResult {
    pub fn sentinel(status: ScanStatus) -> Self {
        DetectorResult::Sentinel { status }
    }

    /// Short status word for listings
    pub fn status_label(&self) -> &'static str {
        match self {
            DetectorResult::Sentinel { status } => status.as_str(),
            DetectorResult::Zone(zone) => match zone.zone.status {
                ZoneStatus::Active => "active",
                ZoneStatus::Confirmed => "confirmed",
            },
            DetectorResult::SupplyDemand(scan) if scan.bias.bias == Bias::Misaligned => {
                "misaligned"
            }
            DetectorResult::SupplyDemand(scan) if !scan.zones.is_empty() => "active",
            DetectorResult::Fvg(scan) if scan.has_fvg => "active",
            _ => "looking",
        }
    }
}

/// Per-variant configuration, one explicit struct per detector
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorConfig {
    Accumulation(AccumulationConfig),
    SupplyDemand(SupplyDemandConfig),
    Fvg(FvgConfig),
}

impl DetectorConfig {
    /// Enabled detectors of a set, in a fixed order
    pub fn from_set(set: &DetectorSet) -> Vec<DetectorConfig> {
        let mut configs = Vec::new();
        if let Some(c) = &set.accumulation {
            configs.push(DetectorConfig::Accumulation(c.clone()));
        }
        if let Some(c) = &set.supply_demand {
            configs.push(DetectorConfig::SupplyDemand(c.clone()));
        }
        if let Some(c) = &set.fvg {
            configs.push(DetectorConfig::Fvg(c.clone()));
        }
        configs
    }
}

/// Inputs shared by every detector for one cycle
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    pub series: &'a CandleSeries,
    /// Pre-fetched bias candles; only supply/demand reads them
    pub bias: Option<&'a BiasInput>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum Detector {
    Accumulation(AccumulationDetector),
    SupplyDemand(SupplyDemandDetector),
    Fvg(FvgDetector),
}

impl Detector {
    fn build(instrument: &str, config: DetectorConfig) -> Self {
        match config {
            DetectorConfig::Accumulation(c) => {
                Detector::Accumulation(AccumulationDetector::new(instrument, c))
            }
            DetectorConfig::SupplyDemand(c) => {
                Detector::SupplyDemand(SupplyDemandDetector::new(instrument, c))
            }
            DetectorConfig::Fvg(c) => Detector::Fvg(FvgDetector::new(instrument, c)),
        }
    }

    fn kind(&self) -> DetectorKind {
        match self {
            Detector::Accumulation(_) => DetectorKind::Accumulation,
            Detector::SupplyDemand(_) => DetectorKind::SupplyDemand,
            Detector::Fvg(_) => DetectorKind::Fvg,
        }
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> DetectorResult {
        match self {
            Detector::Accumulation(d) => d.detect(ctx.series, ctx.now),
            Detector::SupplyDemand(d) => match ctx.bias {
                Some(bias) => d.detect(ctx.series, bias, ctx.now),
                None => d.detect(
                    ctx.series,
                    &BiasInput::Unavailable("bias candles not fetched".to_string()),
                    ctx.now,
                ),
            },
            Detector::Fvg(d) => d.detect(ctx.series, ctx.now),
        }
    }
}

/// The detectors configured for one instrument
#[derive(Debug, Clone)]
pub struct DetectorRegistry {
    instrument: String,
    detectors: Vec<Detector>,
}

impl DetectorRegistry {
    pub fn new(instrument: impl Into<String>, set: &DetectorSet) -> Self {
        let instrument = instrument.into();
        let detectors = DetectorConfig::from_set(set)
            .into_iter()
            .map(|config| Detector::build(&instrument, config))
            .collect();
        Self {
            instrument,
            detectors,
        }
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(Detector::kind).collect()
    }

    /// Bias intervals/periods to fetch before a cycle, if supply/demand is enabled
    pub fn bias_config(&self) -> Option<&SupplyDemandConfig> {
        self.detectors.iter().find_map(|d| match d {
            Detector::SupplyDemand(sd) => Some(sd.config()),
            _ => None,
        })
    }

    /// Run every detector. A panicking detector is reported as `looking` and does not
    /// affect the others.
    pub fn run(&self, ctx: &DetectionContext<'_>) -> Vec<(DetectorKind, DetectorResult)> {
        self.detectors
            .iter()
            .map(|detector| {
                let kind = detector.kind();
                let result = guarded(&self.instrument, kind, || detector.detect(ctx));
                (kind, result)
            })
            .collect()
    }
}

fn guarded(
    instrument: &str,
    kind: DetectorKind,
    detect: impl FnOnce() -> DetectorResult,
) -> DetectorResult {
    match panic::catch_unwind(AssertUnwindSafe(detect)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("[{}] {} detector failed: {}", instrument, kind, reason);
            DetectorResult::sentinel(ScanStatus::Looking)
        }
    }
}
