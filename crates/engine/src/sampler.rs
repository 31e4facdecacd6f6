use crate::error::EngineError;
use crate::retry::{RetryPolicy, retry_with_backoff};
use api_client::MarketDataFeed;
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::MarketRegimeSnapshot;
use database::PopulationStore;
use events::{EngineEvent, RegimeChanged};
use regime::{RegimeClassifier, ThresholdModel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Polls the market feed at a fixed interval and keeps the regime history.
///
/// Every sample is classified, persisted as a `MarketRegimeSnapshot`, and
/// committed label changes are broadcast. When the feed fails, the last
/// committed label is carried forward so the history has no gaps.
pub struct RegimeSampler {
    feed: Arc<dyn MarketDataFeed>,
    store: Arc<dyn PopulationStore>,
    events: broadcast::Sender<EngineEvent>,
    classifier: RegimeClassifier,
    symbol: String,
    interval: Duration,
    retry: RetryPolicy,
}

impl RegimeSampler {
    pub fn new(
        config: &Config,
        feed: Arc<dyn MarketDataFeed>,
        store: Arc<dyn PopulationStore>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let model = ThresholdModel::from_config(&config.regime)?;
        let classifier = RegimeClassifier::new(Box::new(model), config.regime.hysteresis_samples)?;
        Ok(Self {
            feed,
            store,
            events,
            classifier,
            symbol: config.market.symbol.clone(),
            interval: config.regime.sample_interval,
            retry: RetryPolicy::from_config(&config.store),
        })
    }

    pub fn classifier(&self) -> &RegimeClassifier {
        &self.classifier
    }

    /// Picks up the label committed before a restart.
    pub async fn restore(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let store = self.store.as_ref();
        let latest = retry_with_backoff("latest_regime_snapshot", self.retry, || {
            store.latest_regime_snapshot(now)
        })
        .await?;
        if let Some(snapshot) = latest {
            tracing::info!(regime = %snapshot.regime_label, at = %snapshot.timestamp, "Resuming from persisted regime");
            self.classifier.resume(snapshot.regime_label);
        }
        Ok(())
    }

    /// Takes one sample. Returns the persisted snapshot, or `None` when the
    /// feed failed before anything was ever observed.
    pub async fn sample_once(&mut self, now: DateTime<Utc>) -> Result<Option<MarketRegimeSnapshot>, EngineError> {
        let snapshot = match self.feed.get_live_snapshot(&self.symbol).await {
            Ok(features) => {
                let observation = self.classifier.observe(features);
                if let Some(change) = observation.change {
                    tracing::info!(
                        from = ?change.from,
                        to = %change.to,
                        volatility_index = features.volatility_index,
                        trend_strength = features.trend_strength,
                        "Market regime changed"
                    );
                    self.emit(EngineEvent::RegimeChanged(RegimeChanged {
                        timestamp: observation.snapshot.timestamp,
                        from: change.from,
                        to: change.to,
                        volatility_index: features.volatility_index,
                        trend_strength: features.trend_strength,
                    }));
                }
                observation.snapshot
            }
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "Market feed unavailable, carrying the last regime forward");
                match self.classifier.carry_forward(now) {
                    Some(snapshot) => snapshot,
                    None => return Ok(None),
                }
            }
        };

        let store = self.store.as_ref();
        retry_with_backoff("save_regime_snapshot", self.retry, || store.save_regime_snapshot(&snapshot)).await?;
        Ok(Some(snapshot))
    }

    /// Samples until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            symbol = %self.symbol,
            model = self.classifier.model_name(),
            interval_secs = self.interval.as_secs(),
            "Regime sampler started."
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sample_once(Utc::now()).await {
                        tracing::error!(error = %e, "Failed to record regime sample");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Regime sampler shutting down.");
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{ReplayFeed, SyntheticMarket};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use core_types::EvaluationWindow;
    use database::InMemoryStore;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn replay(config: &Config) -> Arc<ReplayFeed> {
        let market = SyntheticMarket {
            start: start(),
            interval: ChronoDuration::hours(1),
            count: 400,
            start_price: 100.0,
            phase_length: 60,
        };
        Arc::new(ReplayFeed::synthetic(&market, 7, config.regime.clone()))
    }

    #[tokio::test]
    async fn samples_are_persisted_and_first_label_is_announced() {
        let config = Config::default();
        let feed = replay(&config);
        feed.advance(config.regime.warmup_candles());
        let store = Arc::new(InMemoryStore::new());
        let (tx, mut rx) = broadcast::channel(16);
        let mut sampler = RegimeSampler::new(&config, feed.clone(), store.clone(), tx).unwrap();

        let now = feed.now().unwrap();
        let snapshot = sampler.sample_once(now).await.unwrap().unwrap();
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::RegimeChanged(e)) if e.from.is_none()));

        let window = EvaluationWindow::new(start(), now + ChronoDuration::hours(1));
        let stored = store.regime_snapshots(window).await.unwrap();
        assert_eq!(stored, vec![snapshot]);
    }

    #[tokio::test]
    async fn feed_gap_carries_the_label_forward() {
        let config = Config::default();
        let feed = replay(&config);
        let store = Arc::new(InMemoryStore::new());
        let (tx, _rx) = broadcast::channel(16);
        let mut sampler = RegimeSampler::new(&config, feed.clone(), store, tx).unwrap();

        // Not enough candles yet: nothing observed, nothing to carry.
        assert!(sampler.sample_once(start()).await.unwrap().is_none());

        feed.advance(config.regime.warmup_candles());
        let first = sampler.sample_once(feed.now().unwrap()).await.unwrap().unwrap();

        let later = first.timestamp + ChronoDuration::hours(5);
        sampler.feed = Arc::new(ReplayFeed::new(Vec::new(), config.regime.clone()));
        let carried = sampler.sample_once(later).await.unwrap().unwrap();
        assert_eq!(carried.regime_label, first.regime_label);
        assert_eq!(carried.timestamp, later);
    }

    #[tokio::test]
    async fn restore_resumes_the_persisted_label() {
        let config = Config::default();
        let store = Arc::new(InMemoryStore::new());
        store
            .save_regime_snapshot(&MarketRegimeSnapshot {
                timestamp: start(),
                regime_label: core_types::RegimeLabel::Volatile,
                volatility_index: 5.0,
                trend_strength: 0.2,
            })
            .await
            .unwrap();
        let (tx, _rx) = broadcast::channel(16);
        let mut sampler = RegimeSampler::new(&config, replay(&config), store, tx).unwrap();
        sampler.restore(start() + ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(sampler.classifier().current(), Some(core_types::RegimeLabel::Volatile));
    }
}
