use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::models::candle::{Candle, CandleSeries};
use crate::models::interval::{interval_ms, period_duration};
use crate::services::provider::CandleProvider;

const HYPERLIQUID_API_URL: &str = "https://api.hyperliquid.xyz/info";

#[derive(Debug, Serialize)]
struct CandleRequest {
    #[serde(rename = "type")]
    request_type: String,
    req: CandleRequestInner,
}

#[derive(Debug, Serialize)]
struct CandleRequestInner {
    coin: String,
    interval: String,
    #[serde(rename = "startTime")]
    start_time: u64,
    #[serde(rename = "endTime")]
    end_time: u64,
}

/// Candle as returned by `candleSnapshot`: millisecond times, string prices
#[derive(Debug, Clone, Deserialize)]
struct WireCandle {
    #[serde(rename = "t")]
    open_time: u64,
    #[serde(rename = "o", deserialize_with = "deserialize_string_to_f64")]
    open: f64,
    #[serde(rename = "h", deserialize_with = "deserialize_string_to_f64")]
    high: f64,
    #[serde(rename = "l", deserialize_with = "deserialize_string_to_f64")]
    low: f64,
    #[serde(rename = "c", deserialize_with = "deserialize_string_to_f64")]
    close: f64,
}

impl From<WireCandle> for Candle {
    fn from(wire: WireCandle) -> Self {
        Candle {
            time: (wire.open_time / 1000) as i64,
            open: wire.open,
            high: wire.high,
            low: wire.low,
            close: wire.close,
        }
    }
}

fn deserialize_string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

#[derive(Clone)]
pub struct HyperliquidClient {
    client: reqwest::Client,
    base_url: String,
}

impl HyperliquidClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: HYPERLIQUID_API_URL.to_string(),
        }
    }

    /// Fetch raw candles for a coin within a time range (epoch ms)
    async fn fetch_candles(
        &self,
        coin: &str,
        interval: &str,
        start_time: u64,
        end_time: u64,
    ) -> Result<Vec<WireCandle>, reqwest::Error> {
        let request = CandleRequest {
            request_type: "candleSnapshot".to_string(),
            req: CandleRequestInner {
                coin: coin.to_string(),
                interval: interval.to_string(),
                start_time,
                end_time,
            },
        };

        self.client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<WireCandle>>()
            .await
    }
}

impl Default for HyperliquidClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleProvider for HyperliquidClient {
    async fn get_candles(
        &self,
        ticker: &str,
        interval: &str,
        period: &str,
    ) -> Result<CandleSeries, ProviderError> {
        if interval_ms(interval).is_none() {
            return Err(ProviderError::UnsupportedInterval(interval.to_string()));
        }
        let span = period_duration(period)
            .ok_or_else(|| ProviderError::UnsupportedPeriod(period.to_string()))?;

        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let (start_time, end_time) = build_time_range(now_ms, span.num_milliseconds() as u64);

        let wire = self
            .fetch_candles(ticker, interval, start_time, end_time)
            .await?;
        to_series(wire)
    }
}

fn build_time_range(now_ms: u64, span_ms: u64) -> (u64, u64) {
    (now_ms.saturating_sub(span_ms), now_ms)
}

fn to_series(wire: Vec<WireCandle>) -> Result<CandleSeries, ProviderError> {
    let candles = wire.into_iter().map(Candle::from).collect();
    Ok(CandleSeries::normalized(candles)?)
}
