use crate::enums::{OrderSide, RegimeLabel};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLCV bar as delivered by a market data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Price and volatility features derived from a rolling window of candles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketFeatures {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// Average true range expressed as a percentage of price.
    pub volatility_index: f64,
    /// Spread between a fast and a slow moving average, measured in ATRs.
    pub trend_strength: f64,
}

/// A labelled sample of market state. Produced continuously by the classifier,
/// consumed read-only by evaluators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketRegimeSnapshot {
    pub timestamp: DateTime<Utc>,
    pub regime_label: RegimeLabel,
    pub volatility_index: f64,
    pub trend_strength: f64,
}

/// A closed trade reported by the trade outcome sink (or by the simulator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: Uuid,
    pub strategy_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Realized profit or loss in account currency.
    pub realized_pnl: Decimal,
    /// Realized return on the capital committed to the trade, in percent.
    pub return_pct: f64,
}

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EvaluationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of `days` days that ends at `end`.
    pub fn trailing(end: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Realized performance of one strategy over one evaluation window.
///
/// Append-only: one record per (strategy, window start). `fitness_score` is
/// filled in by the fitness evaluator and merged on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub strategy_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub regime_label: RegimeLabel,
    pub trade_count: u32,
    /// Fraction of winning trades in `[0, 1]`.
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_like_ratio: f64,
    /// Sum of winning trade returns, in percent. Kept so records aggregate exactly.
    pub gross_profit: f64,
    /// Sum of losing trade returns as a positive number, in percent.
    pub gross_loss: f64,
    pub fitness_score: Option<f64>,
}

impl PerformanceRecord {
    pub fn window(&self) -> EvaluationWindow {
        EvaluationWindow::new(self.window_start, self.window_end)
    }
}

/// Per-strategy risk limits attached to a genome before activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEnvelope {
    pub strategy_id: Uuid,
    /// Share of account equity the strategy may commit, in percent.
    pub max_position_size_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_concurrent_trades: u32,
    pub computed_at: DateTime<Utc>,
}
