//! # Market Data Client
//!
//! Candles and live features for the regime classifier and the offline
//! simulator.
//!
//! ## Public API
//!
//! - `MarketDataFeed`: The abstract interface the engine consumes.
//! - `BinanceFeed`: Public Binance USD-M futures klines over HTTP.
//! - `ReplayFeed`: A fixed or synthetic candle history released step by step.
//! - `timeframe_duration`: Parses candle intervals such as `1h`.

pub mod binance;
pub mod error;
pub mod feed;
pub mod replay;
pub mod responses;

pub use binance::{BINANCE_FUTURES_URL, BinanceFeed};
pub use error::ApiError;
pub use feed::{MarketDataFeed, timeframe_duration};
pub use replay::{ReplayFeed, SyntheticMarket, synthetic_candles};
