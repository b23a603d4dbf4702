use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::config::FvgConfig;
use crate::business_logic::registry::DetectorResult;
use crate::business_logic::session::is_weekend_halt;
use crate::models::candle::{Candle, CandleSeries};
use crate::models::zone::{ScanStatus, Zone, ZoneStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgType {
    Bullish,
    Bearish,
}

/// A three-candle gap. The zone runs from the impulse candle to the candle after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FairValueGap {
    #[serde(flatten)]
    pub zone: Zone,
    pub fvg_type: FvgType,
    pub gap_pct: f64,
    /// Body share of the impulse candle's range
    pub body_ratio: f64,
    /// The impulse candle (N)
    pub impulse: Candle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FvgScan {
    pub has_fvg: bool,
    /// Most recent first
    pub fvgs: Vec<FairValueGap>,
    /// Triples scanned
    pub total: usize,
    pub found: usize,
    pub bullish: usize,
    pub bearish: usize,
}

impl FvgScan {
    fn from_gaps(fvgs: Vec<FairValueGap>, total: usize) -> Self {
        let bullish = fvgs
            .iter()
            .filter(|g| g.fvg_type == FvgType::Bullish)
            .count();
        Self {
            has_fvg: !fvgs.is_empty(),
            total,
            found: fvgs.len(),
            bullish,
            bearish: fvgs.len() - bullish,
            fvgs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FvgDetector {
    instrument: String,
    config: FvgConfig,
}

impl FvgDetector {
    pub fn new(instrument: impl Into<String>, config: FvgConfig) -> Self {
        Self {
            instrument: instrument.into(),
            config,
        }
    }

    pub fn detect(&self, series: &CandleSeries, now: DateTime<Utc>) -> DetectorResult {
        if is_weekend_halt(now) {
            return DetectorResult::sentinel(ScanStatus::Weekend);
        }

        let candles = series.candles();
        // N-1, N, N+1 closed plus the forming candle
        if candles.len() < 4 {
            return DetectorResult::sentinel(ScanStatus::InsufficientData);
        }

        let newest = candles.len() - 3;
        let oldest = (newest + 1).saturating_sub(self.config.lookback).max(1);

        let fvgs: Vec<FairValueGap> = (oldest..=newest)
            .rev()
            .filter_map(|n| self.check_triple(&candles[n - 1], &candles[n], &candles[n + 1]))
            .collect();

        let scan = FvgScan::from_gaps(fvgs, newest + 1 - oldest);
        if scan.has_fvg {
            tracing::debug!(
                "[{}] {} fvg(s): {} bullish, {} bearish",
                self.instrument,
                scan.found,
                scan.bullish,
                scan.bearish
            );
        }
        DetectorResult::Fvg(scan)
    }

    fn check_triple(&self, prev: &Candle, impulse: &Candle, next: &Candle) -> Option<FairValueGap> {
        let triple = [prev, impulse, next];
        if triple.iter().any(|c| c.range() <= 0.0 || c.low <= 0.0) {
            return None;
        }

        let (fvg_type, top, bottom) = if next.low > prev.high {
            (FvgType::Bullish, next.low, prev.high)
        } else if next.high < prev.low {
            (FvgType::Bearish, prev.low, next.high)
        } else {
            return None;
        };

        let midpoint = (impulse.high + impulse.low) / 2.0;
        let gap_pct = (top - bottom) / midpoint;
        if gap_pct < self.config.min_gap_pct {
            return None;
        }

        let consistent = match fvg_type {
            FvgType::Bullish => impulse.is_bullish(),
            FvgType::Bearish => impulse.is_bearish(),
        };
        if !consistent {
            return None;
        }

        let body_ratio = impulse.body() / impulse.range();
        if body_ratio < self.config.impulse_body_pct {
            return None;
        }

        Some(FairValueGap {
            zone: Zone::new(top, bottom, impulse.time, next.time, ZoneStatus::Active),
            fvg_type,
            gap_pct,
            body_ratio,
            impulse: *impulse,
        })
    }
}
