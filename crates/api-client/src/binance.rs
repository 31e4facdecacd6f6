use crate::error::ApiError;
use crate::feed::MarketDataFeed;
use crate::responses::{ApiErrorResponse, parse_klines};
use async_trait::async_trait;
use configuration::RegimeConfig;
use core_types::{Candle, MarketFeatures};
use std::time::Duration;

pub const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";

/// Maximum rows the klines endpoint returns per request.
const KLINES_LIMIT: usize = 1500;

/// Public Binance USD-M futures market data. No credentials are needed.
#[derive(Clone)]
pub struct BinanceFeed {
    client: reqwest::Client,
    base_url: String,
    timeframe: String,
    regime: RegimeConfig,
}

impl BinanceFeed {
    pub fn new(
        base_url: impl Into<String>,
        timeframe: impl Into<String>,
        regime: RegimeConfig,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
            timeframe: timeframe.into(),
            regime,
        })
    }
}

#[async_trait]
impl MarketDataFeed for BinanceFeed {
    async fn get_candles(&self, symbol: &str, timeframe: &str, count: usize) -> Result<Vec<Candle>, ApiError> {
        let url = format!("{}/fapi/v1/klines", self.base_url);
        let limit = count.clamp(1, KLINES_LIMIT).to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("interval", timeframe), ("limit", &limit)])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ApiError::Deserialization(format!(
                    "Failed to deserialize error response: {e}. Original text: {text}"
                ))
            })?;
            return Err(ApiError::Exchange {
                code: api_error.code,
                msg: api_error.msg,
            });
        }

        let candles = parse_klines(&text)?;
        tracing::debug!(symbol, timeframe, count = candles.len(), "Fetched klines");
        Ok(candles)
    }

    async fn get_live_snapshot(&self, symbol: &str) -> Result<MarketFeatures, ApiError> {
        let candles = self
            .get_candles(symbol, &self.timeframe, self.regime.warmup_candles())
            .await?;
        crate::feed::features_from(&candles, &self.regime)
    }
}
