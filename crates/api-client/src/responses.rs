use crate::error::ApiError;
use chrono::{TimeZone, Utc};
use core_types::Candle;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// One row of `GET /fapi/v1/klines`: open time, OHLCV as strings, close
/// time, then quote volume and taker statistics we do not use.
#[derive(Debug, Deserialize)]
pub struct RawKline(
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub i64,
    pub String,
    pub i64,
    pub String,
    pub String,
    pub String,
);

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub msg: String,
}

fn decimal(field: &str, raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw).map_err(|e| ApiError::Deserialization(format!("{field} '{raw}': {e}")))
}

impl TryFrom<RawKline> for Candle {
    type Error = ApiError;

    fn try_from(raw: RawKline) -> Result<Self, Self::Error> {
        Ok(Candle {
            open_time: Utc
                .timestamp_millis_opt(raw.0)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", raw.0)))?,
            open: decimal("open", &raw.1)?,
            high: decimal("high", &raw.2)?,
            low: decimal("low", &raw.3)?,
            close: decimal("close", &raw.4)?,
            volume: decimal("volume", &raw.5)?,
            close_time: Utc
                .timestamp_millis_opt(raw.6)
                .single()
                .ok_or_else(|| ApiError::InvalidData(format!("Invalid close_time: {}", raw.6)))?,
        })
    }
}

/// Parses a klines response body into candles, oldest first.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>, ApiError> {
    let raw: Vec<RawKline> =
        serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    raw.into_iter().map(Candle::try_from).collect()
}
