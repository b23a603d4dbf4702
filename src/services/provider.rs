use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::models::candle::CandleSeries;

/// Source of OHLC candles. Implementations return an ascending, de-duplicated,
/// finite series or an error; the detectors never see malformed input.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Candles covering `period` at `interval` for the detection window
    async fn get_candles(
        &self,
        ticker: &str,
        interval: &str,
        period: &str,
    ) -> Result<CandleSeries, ProviderError>;

    /// Higher-timeframe candles for the bias check (daily or weekly)
    async fn get_bias_candles(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<CandleSeries, ProviderError> {
        self.get_candles(ticker, interval, period).await
    }
}
