use crate::error::AnalyticsError;
use core_types::{EvaluationWindow, PerformanceRecord, RegimeLabel, TradeOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The metrics of a set of trades, independent of any one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub trade_count: u32,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_like_ratio: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
}

/// A stateless calculator for deriving performance metrics from trade outcomes.
#[derive(Debug, Clone)]
pub struct PerformanceEngine {
    /// Profit factor reported when a strategy has profits and no losses.
    profit_factor_cap: f64,
}

impl PerformanceEngine {
    pub fn new(profit_factor_cap: f64) -> Self {
        Self { profit_factor_cap }
    }

    /// Computes the performance record of `strategy_id` over `window`.
    ///
    /// Only trades of that strategy whose exit falls inside the window count.
    /// A window without trades yields a record with `trade_count == 0`.
    pub fn calculate(
        &self,
        strategy_id: Uuid,
        window: EvaluationWindow,
        regime_label: RegimeLabel,
        trades: &[TradeOutcome],
    ) -> Result<PerformanceRecord, AnalyticsError> {
        let inside: Vec<&TradeOutcome> = trades.iter().filter(|t| window.contains(t.exit_time)).collect();
        self.summarize(strategy_id, window, regime_label, inside)
    }

    /// Like [`PerformanceEngine::calculate`], but every trade of the strategy
    /// counts towards `window`, including trades that closed before it opened
    /// and were only reported during it.
    pub fn calculate_attributed(
        &self,
        strategy_id: Uuid,
        window: EvaluationWindow,
        regime_label: RegimeLabel,
        trades: &[TradeOutcome],
    ) -> Result<PerformanceRecord, AnalyticsError> {
        self.summarize(strategy_id, window, regime_label, trades.iter().collect())
    }

    fn summarize(
        &self,
        strategy_id: Uuid,
        window: EvaluationWindow,
        regime_label: RegimeLabel,
        trades: Vec<&TradeOutcome>,
    ) -> Result<PerformanceRecord, AnalyticsError> {
        if window.start >= window.end {
            return Err(AnalyticsError::InvalidWindow {
                start: window.start.to_rfc3339(),
                end: window.end.to_rfc3339(),
            });
        }

        let mut relevant: Vec<&TradeOutcome> = trades
            .into_iter()
            .filter(|t| t.strategy_id == strategy_id)
            .collect();
        // The drawdown walk needs a stable order.
        relevant.sort_by(|a, b| a.exit_time.cmp(&b.exit_time).then(a.trade_id.cmp(&b.trade_id)));

        let returns: Vec<f64> = relevant.iter().map(|t| t.return_pct).collect();
        let metrics = self.metrics_from_returns(&returns);

        tracing::debug!(
            strategy_id = %strategy_id,
            regime = %regime_label,
            trades = metrics.trade_count,
            "Calculated window performance"
        );

        Ok(PerformanceRecord {
            strategy_id,
            window_start: window.start,
            window_end: window.end,
            regime_label,
            trade_count: metrics.trade_count,
            win_rate: metrics.win_rate,
            profit_factor: metrics.profit_factor,
            max_drawdown_pct: metrics.max_drawdown_pct,
            sharpe_like_ratio: metrics.sharpe_like_ratio,
            gross_profit: metrics.gross_profit,
            gross_loss: metrics.gross_loss,
            fitness_score: None,
        })
    }

    /// Combines several records into one set of metrics.
    ///
    /// Gross sums are added and the profit factor recomputed from them; win rate
    /// and Sharpe-like ratio are trade-weighted; drawdown is the worst of all.
    pub fn aggregate<'a>(
        &self,
        records: impl IntoIterator<Item = &'a PerformanceRecord>,
    ) -> WindowMetrics {
        let mut total = WindowMetrics::default();
        let mut weighted_wins = 0.0;
        let mut weighted_sharpe = 0.0;
        for record in records {
            total.trade_count += record.trade_count;
            total.gross_profit += record.gross_profit;
            total.gross_loss += record.gross_loss;
            total.max_drawdown_pct = total.max_drawdown_pct.max(record.max_drawdown_pct);
            weighted_wins += record.win_rate * f64::from(record.trade_count);
            weighted_sharpe += record.sharpe_like_ratio * f64::from(record.trade_count);
        }
        if total.trade_count > 0 {
            let n = f64::from(total.trade_count);
            total.win_rate = weighted_wins / n;
            total.sharpe_like_ratio = weighted_sharpe / n;
        }
        total.profit_factor = self.profit_factor(total.gross_profit, total.gross_loss);
        total
    }

    fn metrics_from_returns(&self, returns: &[f64]) -> WindowMetrics {
        let mut metrics = WindowMetrics {
            trade_count: returns.len() as u32,
            ..WindowMetrics::default()
        };
        if returns.is_empty() {
            return metrics;
        }

        self.calculate_profitability(returns, &mut metrics);
        metrics.max_drawdown_pct = Self::calculate_drawdown(returns);
        metrics.sharpe_like_ratio = Self::calculate_sharpe_like(returns);
        metrics
    }

    fn calculate_profitability(&self, returns: &[f64], metrics: &mut WindowMetrics) {
        let mut wins = 0u32;
        for r in returns {
            if *r > 0.0 {
                metrics.gross_profit += r;
                wins += 1;
            } else {
                metrics.gross_loss += r.abs();
            }
        }
        metrics.win_rate = f64::from(wins) / returns.len() as f64;
        metrics.profit_factor = self.profit_factor(metrics.gross_profit, metrics.gross_loss);
    }

    fn profit_factor(&self, gross_profit: f64, gross_loss: f64) -> f64 {
        if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            self.profit_factor_cap
        } else {
            0.0
        }
    }

    /// Largest peak-to-trough decline of the compounded return curve, in percent.
    fn calculate_drawdown(returns: &[f64]) -> f64 {
        let mut equity = 100.0;
        let mut peak = equity;
        let mut max_drawdown: f64 = 0.0;
        for r in returns {
            equity *= 1.0 + r / 100.0;
            peak = f64::max(peak, equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - equity) / peak * 100.0);
            }
        }
        max_drawdown
    }

    /// Mean over standard deviation of per-trade returns; zero when undefined.
    fn calculate_sharpe_like(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        if std_dev > 0.0 { mean / std_dev } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use core_types::OrderSide;
    use rust_decimal::Decimal;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn trade(strategy_id: Uuid, hour: i64, return_pct: f64) -> TradeOutcome {
        TradeOutcome {
            trade_id: Uuid::new_v4(),
            strategy_id,
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            entry_time: start() + Duration::hours(hour - 1),
            exit_time: start() + Duration::hours(hour),
            realized_pnl: Decimal::ZERO,
            return_pct,
        }
    }

    fn window() -> EvaluationWindow {
        EvaluationWindow::new(start(), start() + Duration::days(1))
    }

    #[test]
    fn computes_window_metrics() {
        let id = Uuid::new_v4();
        let trades = vec![
            trade(id, 1, 2.0),
            trade(id, 2, -1.0),
            trade(id, 3, 3.0),
            trade(id, 4, -1.0),
        ];
        let record = PerformanceEngine::new(5.0)
            .calculate(id, window(), RegimeLabel::Trending, &trades)
            .unwrap();

        assert_eq!(record.trade_count, 4);
        assert_eq!(record.win_rate, 0.5);
        assert_eq!(record.profit_factor, 2.5);
        assert_eq!(record.gross_profit, 5.0);
        assert_eq!(record.gross_loss, 2.0);
        // Peak after +2% is 102; the -1% leaves 100.98, a 1% drawdown.
        assert!((record.max_drawdown_pct - 1.0).abs() < 1e-9);
        assert!(record.sharpe_like_ratio > 0.0);
        assert_eq!(record.fitness_score, None);
    }

    #[test]
    fn ignores_other_strategies_and_out_of_window_trades() {
        let id = Uuid::new_v4();
        let trades = vec![
            trade(id, 1, 2.0),
            trade(Uuid::new_v4(), 2, -5.0),
            trade(id, 30, -5.0),
        ];
        let record = PerformanceEngine::new(5.0)
            .calculate(id, window(), RegimeLabel::Ranging, &trades)
            .unwrap();
        assert_eq!(record.trade_count, 1);
        assert_eq!(record.profit_factor, 5.0, "no losses caps the profit factor");
    }

    #[test]
    fn attributed_trades_count_even_when_they_closed_earlier() {
        let id = Uuid::new_v4();
        let late = trade(id, -3, -1.0);
        let engine = PerformanceEngine::new(5.0);
        let strict = engine
            .calculate(id, window(), RegimeLabel::Ranging, std::slice::from_ref(&late))
            .unwrap();
        let attributed = engine
            .calculate_attributed(id, window(), RegimeLabel::Ranging, &[late, trade(Uuid::new_v4(), 1, 2.0)])
            .unwrap();
        assert_eq!(strict.trade_count, 0);
        assert_eq!(attributed.trade_count, 1);
        assert_eq!(attributed.window_start, start());
    }

    #[test]
    fn empty_window_has_zero_metrics() {
        let record = PerformanceEngine::new(5.0)
            .calculate(Uuid::new_v4(), window(), RegimeLabel::Volatile, &[])
            .unwrap();
        assert_eq!(record.trade_count, 0);
        assert_eq!(record.profit_factor, 0.0);
        assert_eq!(record.max_drawdown_pct, 0.0);
    }

    #[test]
    fn rejects_inverted_window() {
        let bad = EvaluationWindow::new(start(), start());
        assert!(
            PerformanceEngine::new(5.0)
                .calculate(Uuid::new_v4(), bad, RegimeLabel::Trending, &[])
                .is_err()
        );
    }

    #[test]
    fn aggregates_records_exactly() {
        let engine = PerformanceEngine::new(5.0);
        let id = Uuid::new_v4();
        let day2 = EvaluationWindow::new(start() + Duration::days(1), start() + Duration::days(2));
        let a = engine
            .calculate(id, window(), RegimeLabel::Trending, &[trade(id, 1, 4.0), trade(id, 2, -2.0)])
            .unwrap();
        let b = engine
            .calculate(id, day2, RegimeLabel::Trending, &[trade(id, 30, -2.0), trade(id, 31, -2.0)])
            .unwrap();

        let total = engine.aggregate([&a, &b]);
        assert_eq!(total.trade_count, 4);
        assert_eq!(total.win_rate, 0.25);
        assert_eq!(total.profit_factor, 4.0 / 6.0);
        assert_eq!(total.max_drawdown_pct, a.max_drawdown_pct.max(b.max_drawdown_pct));
    }
}
