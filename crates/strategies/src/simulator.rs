use crate::error::StrategyError;
use crate::genome::StrategyGenome;
use crate::indicators::IndicatorSet;
use crate::operators::next_id;
use crate::templates::{STOP_LOSS_GENE, TAKE_PROFIT_GENE};
use chrono::{DateTime, Utc};
use core_types::{Candle, OrderSide, TradeOutcome};
use rand::Rng;
use rust_decimal::prelude::*;

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub symbol: String,
    /// Capital committed by a full-size position.
    pub notional: Decimal,
    /// Candles before this time only warm up indicators; no trade opens before it.
    pub trade_from: Option<DateTime<Utc>>,
}

struct OpenPosition {
    entry_time: DateTime<Utc>,
    entry_price: f64,
    size_fraction: f64,
    stop_price: Option<f64>,
    target_price: Option<f64>,
}

/// Replays `candles` through a genome's rule graph and returns the closed trades.
///
/// Long-only. Entries and rule-based exits fill at the candle close. Stop-loss
/// and take-profit levels come from the genome's genes and fill at their
/// price; when one candle touches both, the stop is assumed to fill first. A
/// position still open after the last candle is closed at its close.
pub fn simulate<R: Rng + ?Sized>(
    genome: &StrategyGenome,
    candles: &[Candle],
    settings: &SimulationSettings,
    rng: &mut R,
) -> Result<Vec<TradeOutcome>, StrategyError> {
    let params = genome.parameters();
    let graph = genome.rule_graph();
    let mut indicators = IndicatorSet::new(graph.required_indicators(params))?;
    let stop_pct = genome.numeric_gene(STOP_LOSS_GENE);
    let target_pct = genome.numeric_gene(TAKE_PROFIT_GENE);

    let mut trades = Vec::new();
    let mut position: Option<OpenPosition> = None;

    for candle in candles {
        let features = indicators.next(candle);
        let close = candle.close.to_f64().unwrap_or_default();

        // --- 1. PROTECTIVE EXITS ---
        if let Some(open) = &position {
            let low = candle.low.to_f64().unwrap_or_default();
            let high = candle.high.to_f64().unwrap_or_default();
            let stop_hit = open.stop_price.filter(|stop| low <= *stop);
            let target_hit = open.target_price.filter(|target| high >= *target);
            if let Some(fill) = stop_hit.or(target_hit) {
                if let Some(open) = position.take() {
                    trades.push(close_trade(genome, settings, open, candle.close_time, fill, rng));
                }
                continue;
            }
        }

        if !indicators.is_warm() {
            continue;
        }
        let decision = graph.decide(&features, params);

        // --- 2. RULE EXITS AND ENTRIES ---
        if position.is_some() {
            if decision.exit {
                if let Some(open) = position.take() {
                    trades.push(close_trade(genome, settings, open, candle.close_time, close, rng));
                }
            }
        } else if decision.enter && decision.size_fraction > 0.0 && close > 0.0 {
            if settings.trade_from.is_some_and(|from| candle.open_time < from) {
                continue;
            }
            position = Some(OpenPosition {
                entry_time: candle.close_time,
                entry_price: close,
                size_fraction: decision.size_fraction,
                stop_price: stop_pct.map(|pct| close * (1.0 - pct / 100.0)),
                target_price: target_pct.map(|pct| close * (1.0 + pct / 100.0)),
            });
        }
    }

    if let (Some(open), Some(last)) = (position.take(), candles.last()) {
        let close = last.close.to_f64().unwrap_or_default();
        trades.push(close_trade(genome, settings, open, last.close_time, close, rng));
    }

    tracing::debug!(
        strategy_id = %genome.id(),
        candles = candles.len(),
        trades = trades.len(),
        "Simulation finished"
    );
    Ok(trades)
}

fn close_trade<R: Rng + ?Sized>(
    genome: &StrategyGenome,
    settings: &SimulationSettings,
    open: OpenPosition,
    exit_time: DateTime<Utc>,
    exit_price: f64,
    rng: &mut R,
) -> TradeOutcome {
    let return_pct = (exit_price - open.entry_price) / open.entry_price * 100.0;
    let committed = settings.notional * Decimal::from_f64(open.size_fraction).unwrap_or_default();
    let realized_pnl = (committed * Decimal::from_f64(return_pct / 100.0).unwrap_or_default())
        .round_dp(8);
    TradeOutcome {
        trade_id: next_id(rng),
        strategy_id: genome.id(),
        symbol: settings.symbol.clone(),
        side: OrderSide::Buy,
        entry_time: open.entry_time,
        exit_time,
        realized_pnl,
        return_pct,
    }
}
