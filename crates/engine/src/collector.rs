use crate::error::EngineError;
use crate::retry::{RetryPolicy, retry_with_backoff};
use chrono::{DateTime, Utc};
use core_types::TradeOutcome;
use database::PopulationStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc};
use uuid::Uuid;

#[derive(Default)]
struct Inbox {
    buffer: Vec<TradeOutcome>,
    /// Every trade id accepted so far, with its exit time for pruning.
    /// Survives [`TradeCollector::drain`], so a redelivered trade is dropped.
    seen: HashMap<Uuid, DateTime<Utc>>,
}

/// The trade-outcome sink.
///
/// Closed trades are buffered until the engine drains them at the start of a
/// cycle, and optionally written to the store's trade log. Every accepted
/// batch wakes the driver.
pub struct TradeCollector {
    store: Arc<dyn PopulationStore>,
    persist: bool,
    retry: RetryPolicy,
    inbox: Mutex<Inbox>,
    new_data: Arc<Notify>,
}

impl TradeCollector {
    pub fn new(store: Arc<dyn PopulationStore>, persist: bool, retry: RetryPolicy) -> Self {
        Self {
            store,
            persist,
            retry,
            inbox: Mutex::new(Inbox::default()),
            new_data: Arc::new(Notify::new()),
        }
    }

    /// Notified whenever new trades arrive.
    pub fn new_data_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.new_data)
    }

    /// Accepts a batch of closed trades and returns how many were new.
    ///
    /// A trade id that was accepted before is ignored, even after the buffer
    /// has been drained. Trades are buffered before the trade log is written,
    /// so a store outage does not lose them for evaluation.
    pub async fn record(&self, trades: Vec<TradeOutcome>) -> Result<usize, EngineError> {
        let accepted: Vec<TradeOutcome> = {
            let mut inbox = self.inbox.lock().await;
            let mut fresh = Vec::with_capacity(trades.len());
            for trade in trades {
                if inbox.seen.contains_key(&trade.trade_id) {
                    continue;
                }
                inbox.seen.insert(trade.trade_id, trade.exit_time);
                fresh.push(trade);
            }
            inbox.buffer.extend(fresh.iter().cloned());
            fresh
        };
        if accepted.is_empty() {
            return Ok(0);
        }
        self.new_data.notify_one();
        tracing::debug!(count = accepted.len(), "Trade outcomes collected");

        if self.persist {
            let store = self.store.as_ref();
            let batch = accepted.as_slice();
            retry_with_backoff("save_trades", self.retry, move || store.save_trades(batch)).await?;
        }
        Ok(accepted.len())
    }

    /// Takes every buffered trade.
    pub async fn drain(&self) -> Vec<TradeOutcome> {
        std::mem::take(&mut self.inbox.lock().await.buffer)
    }

    pub async fn pending(&self) -> usize {
        self.inbox.lock().await.buffer.len()
    }

    /// Marks trades as already accepted without buffering them, e.g. trades
    /// reloaded from the store after a restart.
    pub async fn remember(&self, trades: &[TradeOutcome]) {
        let mut inbox = self.inbox.lock().await;
        for trade in trades {
            inbox.seen.insert(trade.trade_id, trade.exit_time);
        }
    }

    /// Forgets the ids of trades that closed before `cutoff`.
    pub async fn forget_before(&self, cutoff: DateTime<Utc>) {
        self.inbox.lock().await.seen.retain(|_, exit| *exit >= cutoff);
    }

    /// Consumes a stream of trade outcomes until the sender side closes.
    pub async fn run(self: Arc<Self>, mut trades: mpsc::Receiver<TradeOutcome>) {
        tracing::info!("Trade collector started.");
        while let Some(first) = trades.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = trades.try_recv() {
                batch.push(next);
            }
            if let Err(e) = self.record(batch).await {
                tracing::error!(error = %e, "Failed to persist trade outcomes; they remain buffered for evaluation");
            }
        }
        tracing::info!("Trade stream closed. Trade collector shutting down.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use core_types::{EvaluationWindow, OrderSide};
    use database::InMemoryStore;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn trade(id: u128) -> TradeOutcome {
        let now = Utc::now();
        TradeOutcome {
            trade_id: Uuid::from_u128(id),
            strategy_id: Uuid::from_u128(99),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            entry_time: now - Duration::hours(1),
            exit_time: now,
            realized_pnl: dec!(4.2),
            return_pct: 0.4,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_delay: std::time::Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn duplicates_are_ignored_and_trades_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let collector = TradeCollector::new(store.clone(), true, policy());
        assert_eq!(collector.record(vec![trade(1), trade(2)]).await.unwrap(), 2);
        assert_eq!(collector.record(vec![trade(2), trade(3)]).await.unwrap(), 1);
        assert_eq!(collector.pending().await, 3);

        let window = EvaluationWindow::trailing(Utc::now() + Duration::minutes(1), 1);
        assert_eq!(store.trades_in_window(window).await.unwrap().len(), 3);
        assert_eq!(collector.drain().await.len(), 3);
        assert_eq!(collector.pending().await, 0);
    }

    #[tokio::test]
    async fn redelivery_after_drain_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let collector = TradeCollector::new(store, false, policy());
        assert_eq!(collector.record(vec![trade(1)]).await.unwrap(), 1);
        assert_eq!(collector.drain().await.len(), 1);
        assert_eq!(collector.record(vec![trade(1)]).await.unwrap(), 0);
        assert_eq!(collector.pending().await, 0);

        collector.forget_before(Utc::now() + Duration::hours(1)).await;
        assert_eq!(collector.record(vec![trade(1)]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remembered_trades_are_not_accepted_again() {
        let store = Arc::new(InMemoryStore::new());
        let collector = TradeCollector::new(store, false, policy());
        collector.remember(&[trade(7)]).await;
        assert_eq!(collector.record(vec![trade(7), trade(8)]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_outage_keeps_trades_buffered() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let collector = TradeCollector::new(store, true, policy());
        assert!(collector.record(vec![trade(1)]).await.is_err());
        assert_eq!(collector.pending().await, 1);
    }

    #[tokio::test]
    async fn stream_is_consumed_until_closed() {
        let store = Arc::new(InMemoryStore::new());
        let collector = Arc::new(TradeCollector::new(store, false, policy()));
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(Arc::clone(&collector).run(rx));
        tx.send(trade(1)).await.unwrap();
        tx.send(trade(2)).await.unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(collector.pending().await, 2);
    }
}
