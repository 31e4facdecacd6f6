#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::Config;
use core_types::{MarketRegimeSnapshot, OrderSide, PerformanceRecord, RegimeLabel, TradeOutcome};
use database::{InMemoryStore, PopulationStore};
use engine::EvolutionEngine;
use events::EngineEvent;
use executor::PaperConnector;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct Harness {
    pub engine: EvolutionEngine,
    pub store: Arc<InMemoryStore>,
    pub connector: Arc<PaperConnector>,
    pub events: broadcast::Receiver<EngineEvent>,
}

/// Noon on a fixed Monday, so a few hours of trading stay on one UTC day.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

pub fn config(seed: u64) -> Config {
    let mut config = Config::default();
    config.evolution.seed = Some(seed);
    config.store.max_retries = 3;
    config.store.retry_base_delay = std::time::Duration::from_millis(1);
    config
}

pub fn harness(config: Config) -> Harness {
    harness_on(config, Arc::new(InMemoryStore::new()))
}

pub fn harness_on(config: Config, store: Arc<InMemoryStore>) -> Harness {
    let connector = Arc::new(PaperConnector::new());
    let (tx, events) = broadcast::channel(64);
    let engine = EvolutionEngine::new(Arc::new(config), store.clone(), connector.clone(), tx).unwrap();
    Harness {
        engine,
        store,
        connector,
        events,
    }
}

/// A record for one past day with `trades` trades and the given profit factor.
pub fn record(strategy_id: Uuid, regime: RegimeLabel, trades: u32, profit_factor: f64) -> PerformanceRecord {
    let start = t0() - Duration::days(2);
    let gross_loss = 10.0;
    PerformanceRecord {
        strategy_id,
        window_start: start,
        window_end: start + Duration::days(1),
        regime_label: regime,
        trade_count: trades,
        win_rate: 0.5,
        profit_factor,
        max_drawdown_pct: 5.0,
        sharpe_like_ratio: 0.5,
        gross_profit: gross_loss * profit_factor,
        gross_loss,
        fitness_score: None,
    }
}

pub async fn set_regime(store: &InMemoryStore, at: DateTime<Utc>, label: RegimeLabel) {
    store
        .save_regime_snapshot(&MarketRegimeSnapshot {
            timestamp: at,
            regime_label: label,
            volatility_index: 1.0,
            trend_strength: 1.0,
        })
        .await
        .unwrap();
}

pub fn trade(strategy_id: Uuid, exit_time: DateTime<Utc>, pnl: Decimal) -> TradeOutcome {
    TradeOutcome {
        trade_id: Uuid::new_v4(),
        strategy_id,
        symbol: "BTCUSDT".to_string(),
        side: OrderSide::Buy,
        entry_time: exit_time - Duration::minutes(30),
        exit_time,
        realized_pnl: pnl,
        return_pct: -1.0,
    }
}

pub fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
