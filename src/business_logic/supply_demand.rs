use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::config::SupplyDemandConfig;
use crate::business_logic::indicators;
use crate::business_logic::registry::DetectorResult;
use crate::business_logic::session::{is_weekend_halt, session_at, Session};
use crate::models::candle::{Candle, CandleSeries};
use crate::models::zone::{ScanStatus, Zone, ZoneStatus, ZoneType};

/// Impulse body must fill at least this share of its own range
pub const IMPULSE_BODY_RATIO: f64 = 0.60;
/// Shortest series the zone scan runs on
pub const MIN_CANDLES: usize = 10;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    fn of(candle: &Candle) -> Self {
        if candle.close > candle.open {
            Direction::Bullish
        } else {
            Direction::Bearish
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Misaligned,
}

/// Higher-timeframe agreement between the last completed daily and weekly candle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasInfo {
    pub bias: Bias,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_bias: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_bias: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_close: Option<f64>,
    /// Why the bias could not be resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BiasInfo {
    pub fn misaligned(reason: impl Into<String>) -> Self {
        Self {
            bias: Bias::Misaligned,
            daily_bias: None,
            weekly_bias: None,
            daily_open: None,
            daily_close: None,
            weekly_open: None,
            weekly_close: None,
            reason: Some(reason.into()),
        }
    }
}

/// Bias candles as handed over by the provider, or the reason they could not be fetched
#[derive(Debug, Clone, PartialEq)]
pub enum BiasInput {
    Candles {
        daily: CandleSeries,
        weekly: CandleSeries,
    },
    Unavailable(String),
}

impl BiasInput {
    pub fn resolve(&self) -> BiasInfo {
        match self {
            BiasInput::Candles { daily, weekly } => resolve_bias(daily, weekly),
            BiasInput::Unavailable(reason) => BiasInfo::misaligned(reason.clone()),
        }
    }
}

/// Compare the most recently completed daily and weekly candles (second to last of each).
pub fn resolve_bias(daily: &CandleSeries, weekly: &CandleSeries) -> BiasInfo {
    let (Some(day), Some(week)) = (daily.last_closed(), weekly.last_closed()) else {
        return BiasInfo::misaligned("insufficient data");
    };

    let daily_bias = Direction::of(day);
    let weekly_bias = Direction::of(week);
    let bias = match (daily_bias, weekly_bias) {
        (Direction::Bullish, Direction::Bullish) => Bias::Bullish,
        (Direction::Bearish, Direction::Bearish) => Bias::Bearish,
        _ => Bias::Misaligned,
    };

    BiasInfo {
        bias,
        daily_bias: Some(daily_bias),
        weekly_bias: Some(weekly_bias),
        daily_open: Some(day.open),
        daily_close: Some(day.close),
        weekly_open: Some(week.open),
        weekly_close: Some(week.close),
        reason: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplyDemandZone {
    #[serde(flatten)]
    pub zone: Zone,
    /// Session of the indecision candle (`none` for a pre-open candle)
    pub session: Session,
    /// Impulse body over the series' average body
    pub impulse_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplyDemandScan {
    pub bias: BiasInfo,
    /// Most recent first
    pub zones: Vec<SupplyDemandZone>,
}

/// Indecision-then-impulse zone scanner gated by daily/weekly bias
#[derive(Debug, Clone)]
pub struct SupplyDemandDetector {
    instrument: String,
    config: SupplyDemandConfig,
}

impl SupplyDemandDetector {
    pub fn new(instrument: impl Into<String>, config: SupplyDemandConfig) -> Self {
        Self {
            instrument: instrument.into(),
            config,
        }
    }

    pub fn config(&self) -> &SupplyDemandConfig {
        &self.config
    }

    pub fn detect(
        &self,
        series: &CandleSeries,
        bias: &BiasInput,
        now: DateTime<Utc>,
    ) -> DetectorResult {
        if is_weekend_halt(now) {
            return DetectorResult::sentinel(ScanStatus::Weekend);
        }

        let bias = bias.resolve();
        let look_for = match bias.bias {
            Bias::Bullish => ZoneType::Demand,
            Bias::Bearish => ZoneType::Supply,
            Bias::Misaligned => {
                tracing::debug!(
                    "[{}] supply/demand bias misaligned{}",
                    self.instrument,
                    bias.reason
                        .as_deref()
                        .map(|r| format!(" ({r})"))
                        .unwrap_or_default()
                );
                return DetectorResult::SupplyDemand(SupplyDemandScan {
                    bias,
                    zones: Vec::new(),
                });
            }
        };

        if series.len() < MIN_CANDLES {
            return DetectorResult::sentinel(ScanStatus::InsufficientData);
        }

        let zones = self.scan(series.candles(), look_for, now);
        if !zones.is_empty() {
            tracing::debug!(
                "[{}] {} {:?} zone(s) live",
                self.instrument,
                zones.len(),
                look_for
            );
        }

        DetectorResult::SupplyDemand(SupplyDemandScan { bias, zones })
    }

    fn scan(&self, candles: &[Candle], look_for: ZoneType, now: DateTime<Utc>) -> Vec<SupplyDemandZone> {
        let mut zones = Vec::new();

        let Some(avg_body) = indicators::mean(candles.iter().map(Candle::body)) else {
            return zones;
        };
        if avg_body <= 0.0 {
            return zones;
        }

        let last_idx = candles.len() - 1;
        let last_closed = &candles[last_idx - 1];
        let cutoff = now.timestamp() - self.config.max_age_days * SECONDS_PER_DAY;

        for i in (1..last_idx).rev() {
            let candle = &candles[i];
            if candle.time < cutoff {
                break;
            }

            let session = session_at(candle.time);
            if !self.in_valid_session(session, &candles[i + 1]) {
                continue;
            }

            if !is_indecision(candle, self.config.wick_ratio) {
                continue;
            }

            let impulse = &candles[i + 1];
            let Some(impulse_ratio) = self.impulse_ratio(impulse, avg_body) else {
                continue;
            };

            let zone_type = if impulse.is_bullish() {
                ZoneType::Demand
            } else {
                ZoneType::Supply
            };
            if zone_type != look_for {
                continue;
            }

            // Price has come back into the zone since it formed
            let invalidated = match zone_type {
                ZoneType::Demand => last_closed.low <= candle.high,
                ZoneType::Supply => last_closed.high >= candle.low,
            };
            if invalidated {
                continue;
            }

            zones.push(SupplyDemandZone {
                zone: Zone::new(
                    candle.high,
                    candle.low,
                    candle.time,
                    candles[last_idx].time,
                    ZoneStatus::Active,
                )
                .with_type(zone_type),
                session,
                impulse_ratio,
            });

            if zones.len() >= self.config.max_zones {
                break;
            }
        }

        zones
    }

    /// In a valid session, or the candle right before one opens
    fn in_valid_session(&self, session: Session, next: &Candle) -> bool {
        let valid = &self.config.valid_sessions;
        valid.contains(&session) || valid.contains(&session_at(next.time))
    }

    fn impulse_ratio(&self, impulse: &Candle, avg_body: f64) -> Option<f64> {
        let range = impulse.range();
        if range <= 0.0 {
            return None;
        }
        let body = impulse.body();
        if body < avg_body * self.config.impulse_multiplier {
            return None;
        }
        if body / range < IMPULSE_BODY_RATIO {
            return None;
        }
        Some(body / avg_body)
    }
}

/// Wicks make up at least `wick_ratio` of the candle's range
fn is_indecision(candle: &Candle, wick_ratio: f64) -> bool {
    let range = candle.range();
    if range <= 0.0 {
        return false;
    }
    (range - candle.body()) / range >= wick_ratio
}
