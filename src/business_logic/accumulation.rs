use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::config::AccumulationConfig;
use crate::business_logic::indicators::{self, ADX_PERIOD};
use crate::business_logic::registry::DetectorResult;
use crate::business_logic::session::{
    effective_limit, is_weekend_halt, resolve_session, Session,
};
use crate::models::candle::{Candle, CandleSeries};
use crate::models::zone::{ScanStatus, Zone, ZoneStatus};

/// Choppiness at or above this makes a box "found"
pub const CHOP_FOUND: f64 = 0.44;
/// Choppiness at or above this (and below [`CHOP_FOUND`]) makes a box "potential"
pub const CHOP_POTENTIAL: f64 = 0.36;
/// ADX below this ranks a box ahead of its tier
pub const LOW_ADX: f64 = 10.0;

/// Choppiness tier of a surviving window. `Found` ranks ahead of `Potential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Found,
    Potential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutDirection {
    Up,
    Down,
}

/// Statistics of an accumulation window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxMetrics {
    pub tier: Tier,
    pub range_pct: f64,
    pub slope: f64,
    pub adx: Option<f64>,
    pub choppiness: f64,
    pub avg_body: f64,
}

impl BoxMetrics {
    fn is_low_adx(&self) -> bool {
        self.adx.is_some_and(|adx| adx < LOW_ADX)
    }
}

/// Runner-up box, reported for information only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryZone {
    pub top: f64,
    pub bottom: f64,
    pub start: i64,
    pub end: i64,
    #[serde(flatten)]
    pub metrics: BoxMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakout {
    pub direction: BreakoutDirection,
    pub body: f64,
    /// Breakout body over the box's average body
    pub impulse_ratio: Option<f64>,
    pub candle: Candle,
}

/// Best consolidation box for the current cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulationZone {
    #[serde(flatten)]
    pub zone: Zone,
    pub session: Session,
    #[serde(flatten)]
    pub metrics: BoxMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakout: Option<Breakout>,
    pub secondary_zone: Option<SecondaryZone>,
}

/// Window that passed every filter
#[derive(Debug, Clone)]
struct Candidate {
    top: f64,
    bottom: f64,
    start: i64,
    end: i64,
    metrics: BoxMetrics,
}

impl From<Candidate> for SecondaryZone {
    fn from(candidate: Candidate) -> Self {
        Self {
            top: candidate.top,
            bottom: candidate.bottom,
            start: candidate.start,
            end: candidate.end,
            metrics: candidate.metrics,
        }
    }
}

/// Multi-window sideways-accumulation scanner for a single instrument
#[derive(Debug, Clone)]
pub struct AccumulationDetector {
    instrument: String,
    config: AccumulationConfig,
}

impl AccumulationDetector {
    pub fn new(instrument: impl Into<String>, config: AccumulationConfig) -> Self {
        Self {
            instrument: instrument.into(),
            config,
        }
    }

    /// Scan for the best box ending right before the last closed candle and
    /// classify that candle as inside (active) or an impulsive breakout (confirmed).
    pub fn detect(&self, series: &CandleSeries, now: DateTime<Utc>) -> DetectorResult {
        if is_weekend_halt(now) {
            return DetectorResult::sentinel(ScanStatus::Weekend);
        }

        let session = resolve_session(now);
        if session == Session::None {
            return DetectorResult::sentinel(ScanStatus::OutOfSession);
        }

        let candles = series.candles();
        if candles.len() < self.config.min_candles + 4 {
            tracing::debug!(
                "[{}] accumulation: {} candles, need {}",
                self.instrument,
                candles.len(),
                self.config.min_candles + 4
            );
            return DetectorResult::sentinel(ScanStatus::InsufficientData);
        }

        // Layout, newest first: forming candle, breakout candle, then the windows
        let breakout_idx = candles.len() - 2;
        let breakout = candles[breakout_idx];
        let scan_start = candles.len().saturating_sub(self.config.lookback);
        let limit = effective_limit(session, &self.config);

        let mut candidates = Vec::new();
        for window_size in self.config.min_candles..=self.config.lookback {
            let Some(first) = breakout_idx.checked_sub(window_size) else {
                continue;
            };
            if first < scan_start {
                continue;
            }
            if let Some(candidate) = self.evaluate_window(&candles[first..breakout_idx], limit) {
                candidates.push(candidate);
            }
        }

        rank(&mut candidates);

        let mut ranked = candidates.into_iter();
        let Some(best) = ranked.next() else {
            return DetectorResult::sentinel(ScanStatus::Looking);
        };
        let secondary_zone = ranked.next().map(SecondaryZone::from);

        let inside = breakout.body_low() >= best.bottom && breakout.body_high() <= best.top;
        if inside {
            tracing::debug!(
                "[{}] accumulation active {:.5}-{:.5} ({:?}, slope {:.2e})",
                self.instrument,
                best.bottom,
                best.top,
                best.metrics.tier,
                best.metrics.slope
            );
            return DetectorResult::Zone(Box::new(AccumulationZone {
                zone: Zone::new(best.top, best.bottom, best.start, best.end, ZoneStatus::Active),
                session,
                metrics: best.metrics,
                breakout: None,
                secondary_zone,
            }));
        }

        let direction = if breakout.body_high() > best.top {
            BreakoutDirection::Up
        } else {
            BreakoutDirection::Down
        };
        let body = breakout.body();
        let avg_body = best.metrics.avg_body;

        // A non-impulsive poke through the edge just means "scan again next cycle"
        if body <= avg_body {
            tracing::debug!(
                "[{}] accumulation breakout {:?} not impulsive (body {:.5} <= avg {:.5})",
                self.instrument,
                direction,
                body,
                avg_body
            );
            return DetectorResult::sentinel(ScanStatus::Looking);
        }

        let impulse_ratio = (avg_body > 0.0).then(|| body / avg_body);
        tracing::info!(
            "[{}] accumulation breakout CONFIRMED {:?} from {:.5}-{:.5} (impulse {:.2}x)",
            self.instrument,
            direction,
            best.bottom,
            best.top,
            impulse_ratio.unwrap_or(f64::INFINITY)
        );

        DetectorResult::Zone(Box::new(AccumulationZone {
            zone: Zone::new(best.top, best.bottom, best.start, best.end, ZoneStatus::Confirmed),
            session,
            metrics: best.metrics,
            breakout: Some(Breakout {
                direction,
                body,
                impulse_ratio,
                candle: breakout,
            }),
            secondary_zone,
        }))
    }

    fn evaluate_window(&self, window: &[Candle], limit: Option<f64>) -> Option<Candidate> {
        let (first, last) = (window.first()?, window.last()?);
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();

        let avg_price = indicators::mean(closes.iter().copied())?;
        if avg_price == 0.0 {
            return None;
        }

        // Box bounds come from bodies, not wicks
        let top = window.iter().map(Candle::body_high).fold(f64::MIN, f64::max);
        let bottom = window.iter().map(Candle::body_low).fold(f64::MAX, f64::min);
        let range_pct = (top - bottom) / avg_price;

        if limit.is_some_and(|limit| range_pct > limit) {
            return None;
        }

        let slope_limit = self.config.threshold_pct * 0.10 / window.len() as f64;
        let slope = indicators::slope_pct(&closes, avg_price)?;
        if slope >= slope_limit {
            return None;
        }

        let adx = indicators::adx(window, ADX_PERIOD);
        if adx.is_some_and(|adx| adx > self.config.adx_threshold) {
            return None;
        }

        let choppiness = indicators::choppiness(&closes);
        let tier = if choppiness >= CHOP_FOUND {
            Tier::Found
        } else if choppiness >= CHOP_POTENTIAL {
            Tier::Potential
        } else {
            return None;
        };

        let avg_body = indicators::mean(window.iter().map(Candle::body)).unwrap_or(0.0);

        Some(Candidate {
            top,
            bottom,
            start: first.time,
            end: last.time,
            metrics: BoxMetrics {
                tier,
                range_pct,
                slope,
                adx,
                choppiness,
                avg_body,
            },
        })
    }
}

/// Found before potential; inside a tier ADX < 10 first, then flattest slope.
/// The sort is stable, so equal keys keep ascending window size.
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| compare_metrics(&a.metrics, &b.metrics));
}

fn compare_metrics(a: &BoxMetrics, b: &BoxMetrics) -> Ordering {
    a.tier
        .cmp(&b.tier)
        .then_with(|| b.is_low_adx().cmp(&a.is_low_adx()))
        .then_with(|| a.slope.total_cmp(&b.slope))
}
