use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One OHLC candle. `time` is the candle open time in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Absolute open-close distance
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-low range
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    fn is_finite(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("candle at {time} has a non-finite price")]
    NonFinite { time: i64 },
    #[error("candle at {time} is not after the previous candle")]
    OutOfOrder { time: i64 },
    #[error("candle at {time} has high below low")]
    InvertedRange { time: i64 },
}

/// Ordered candle sequence with strictly increasing, unique times and finite prices.
///
/// The last candle is treated by every detector as still forming.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        let mut prev_time: Option<i64> = None;
        for candle in &candles {
            if !candle.is_finite() {
                return Err(SeriesError::NonFinite { time: candle.time });
            }
            if candle.high < candle.low {
                return Err(SeriesError::InvertedRange { time: candle.time });
            }
            if prev_time.is_some_and(|t| candle.time <= t) {
                return Err(SeriesError::OutOfOrder { time: candle.time });
            }
            prev_time = Some(candle.time);
        }

        Ok(Self { candles })
    }

    /// Sort by time and drop duplicate timestamps (the later entry wins) before validating.
    pub fn normalized(mut candles: Vec<Candle>) -> Result<Self, SeriesError> {
        candles.sort_by_key(|c| c.time);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.time == candle.time => *last = candle,
                _ => deduped.push(candle),
            }
        }
        Self::new(deduped)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Most recent fully closed candle (second to last).
    pub fn last_closed(&self) -> Option<&Candle> {
        self.candles.len().checked_sub(2).map(|i| &self.candles[i])
    }
}
