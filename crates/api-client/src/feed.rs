use crate::error::ApiError;
use async_trait::async_trait;
use chrono::Duration;
use configuration::RegimeConfig;
use core_types::{Candle, MarketFeatures};

/// The engine's view of market data.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// The most recent `count` closed candles, oldest first.
    async fn get_candles(&self, symbol: &str, timeframe: &str, count: usize) -> Result<Vec<Candle>, ApiError>;

    /// Current price, volatility and trend features for `symbol`.
    async fn get_live_snapshot(&self, symbol: &str) -> Result<MarketFeatures, ApiError>;
}

pub(crate) fn features_from(candles: &[Candle], regime: &RegimeConfig) -> Result<MarketFeatures, ApiError> {
    regime::compute_features(candles, regime).map_err(|e| ApiError::InvalidData(e.to_string()))
}

/// Parses a candle interval such as `15m`, `1h`, `4h`, `1d` or `1w`.
pub fn timeframe_duration(timeframe: &str) -> Result<Duration, ApiError> {
    let unsupported = || ApiError::UnsupportedTimeframe(timeframe.to_string());
    let (split, _) = timeframe.char_indices().last().ok_or_else(unsupported)?;
    let (amount, unit) = timeframe.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| unsupported())?;
    if amount <= 0 {
        return Err(unsupported());
    }
    match unit {
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        "w" => Ok(Duration::weeks(amount)),
        _ => Err(unsupported()),
    }
}
