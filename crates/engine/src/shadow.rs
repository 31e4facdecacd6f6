use crate::error::EngineError;
use crate::generation::{Generation, GenerationHandle};
use api_client::{MarketDataFeed, timeframe_duration};
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{Candle, GenomeStatus, TradeOutcome};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use strategies::{SimulationSettings, StrategyGenome, simulate};
use tokio::sync::{mpsc, watch};

/// Capital a genome trades with: its envelope when active, the minimum
/// position while it is still a candidate, nothing once retired.
pub(crate) fn shadow_notional(config: &Config, generation: &Generation, genome: &StrategyGenome) -> Option<Decimal> {
    let position_pct = match genome.status() {
        GenomeStatus::Active => generation
            .envelope(genome.id())
            .map_or(config.risk.min_position_size_pct, |e| e.max_position_size_pct),
        GenomeStatus::Candidate => config.risk.min_position_size_pct,
        GenomeStatus::Retired => return None,
    };
    Some(config.risk.account_equity * position_pct / dec!(100))
}

/// Paper-trades the live generation on closed market candles.
///
/// Every poll replays the candles closed since the previous poll through each
/// member's rule graph and sends the resulting trades to the collector. A
/// position still open at the newest candle is marked to its close.
pub struct ShadowTrader {
    config: Arc<Config>,
    feed: Arc<dyn MarketDataFeed>,
    generation: GenerationHandle,
    trades: mpsc::Sender<TradeOutcome>,
    rng: StdRng,
    candle_interval: chrono::Duration,
    warmup: usize,
    poll_interval: Duration,
    /// Close time of the newest candle already traded.
    traded_until: Option<DateTime<Utc>>,
}

impl ShadowTrader {
    pub fn new(
        config: Arc<Config>,
        feed: Arc<dyn MarketDataFeed>,
        generation: GenerationHandle,
        trades: mpsc::Sender<TradeOutcome>,
    ) -> Result<Self, EngineError> {
        let candle_interval = timeframe_duration(&config.market.timeframe)?;
        let rng = match config.evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            warmup: config.regime.warmup_candles(),
            poll_interval: config.market.realtime_update_interval,
            config,
            feed,
            generation,
            trades,
            rng,
            candle_interval,
            traded_until: None,
        })
    }

    /// Trades the candles closed since the last poll and returns how many
    /// trades were sent. The first poll only marks where trading starts.
    pub async fn poll(&mut self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let count = self.lookback(now);
        let candles: Vec<Candle> = self
            .feed
            .get_candles(&self.config.market.symbol, &self.config.market.timeframe, count)
            .await?
            .into_iter()
            .filter(|c| c.close_time <= now)
            .collect();
        let Some(newest) = candles.last().map(|c| c.close_time) else {
            return Ok(0);
        };
        let from = match self.traded_until {
            None => {
                tracing::info!(from = %newest, "Shadow trading starts after the latest closed candle");
                self.traded_until = Some(newest);
                return Ok(0);
            }
            Some(until) if until >= newest => return Ok(0),
            Some(until) => until,
        };

        let generation = self.generation.current();
        let mut trades = Vec::new();
        for genome in &generation.members {
            let Some(notional) = shadow_notional(&self.config, &generation, genome) else {
                continue;
            };
            let settings = SimulationSettings {
                symbol: self.config.market.symbol.clone(),
                notional,
                trade_from: Some(from),
            };
            trades.extend(simulate(genome, &candles, &settings, &mut self.rng)?);
        }
        self.traded_until = Some(newest);

        let sent = trades.len();
        for trade in trades {
            if self.trades.send(trade).await.is_err() {
                return Err(EngineError::CollectorClosed);
            }
        }
        tracing::debug!(generation = generation.number, trades = sent, until = %newest, "Shadow trades sent");
        Ok(sent)
    }

    /// Candles to request: the warm-up plus everything closed since the last
    /// poll, bounded by the feed's history limit.
    fn lookback(&self, now: DateTime<Utc>) -> usize {
        let fresh = match self.traded_until {
            Some(until) if self.candle_interval > chrono::Duration::zero() => {
                ((now - until).num_seconds() / self.candle_interval.num_seconds().max(1)).max(0) as usize + 1
            }
            _ => 1,
        };
        (self.warmup + fresh).min(self.config.market.max_historical_candles.max(self.warmup + 1))
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    /// Dropping the trader closes the trade channel.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            symbol = %self.config.market.symbol,
            timeframe = %self.config.market.timeframe,
            interval_secs = self.poll_interval.as_secs(),
            "Shadow trader started."
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll(Utc::now()).await {
                        Ok(_) => {}
                        Err(EngineError::MarketData(e)) => {
                            tracing::warn!(error = %e, "Market feed unavailable, skipping this poll");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Shadow trading stopped");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Shadow trader shutting down.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::TradeCollector;
    use crate::retry::RetryPolicy;
    use api_client::{ReplayFeed, SyntheticMarket};
    use chrono::TimeZone;
    use database::InMemoryStore;
    use strategies::templates;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.evolution.seed = Some(5);
        config
    }

    fn feed(config: &Config) -> Arc<ReplayFeed> {
        let market = SyntheticMarket {
            start: start(),
            interval: chrono::Duration::hours(1),
            count: 600,
            start_price: 100.0,
            phase_length: 40,
        };
        Arc::new(ReplayFeed::synthetic(&market, 11, config.regime.clone()))
    }

    fn candidates(config: &Config) -> (watch::Sender<Arc<Generation>>, GenerationHandle) {
        let mut rng = StdRng::seed_from_u64(3);
        let members = templates::seed_population(config.evolution.population_size, &mut rng, start()).unwrap();
        let generation = Generation {
            members,
            ..Generation::empty()
        };
        let (tx, rx) = watch::channel(Arc::new(generation));
        (tx, GenerationHandle::new(rx))
    }

    #[test]
    fn candidates_trade_the_minimum_position() {
        let config = config();
        let (generation, _handle) = candidates(&config);
        let generation = generation.borrow();
        let genome = &generation.members[0];
        let expected = config.risk.account_equity * config.risk.min_position_size_pct / dec!(100);
        assert_eq!(shadow_notional(&config, &generation, genome), Some(expected));
        let retired = genome.with_status(GenomeStatus::Retired);
        assert_eq!(shadow_notional(&config, &generation, &retired), None);
    }

    #[tokio::test]
    async fn only_candles_closed_after_the_first_poll_are_traded() {
        let config = config();
        let feed = feed(&config);
        feed.advance(config.regime.warmup_candles());
        let (_generation, handle) = candidates(&config);
        let (tx, mut rx) = mpsc::channel(4096);
        let mut trader = ShadowTrader::new(Arc::new(config.clone()), feed.clone(), handle, tx).unwrap();

        let started = feed.now().unwrap();
        assert_eq!(trader.poll(started).await.unwrap(), 0);
        assert_eq!(trader.poll(started).await.unwrap(), 0);

        feed.advance(200);
        let sent = trader.poll(feed.now().unwrap()).await.unwrap();
        let mut received = Vec::new();
        while let Ok(trade) = rx.try_recv() {
            received.push(trade);
        }
        assert_eq!(received.len(), sent);
        assert!(sent > 0);
        assert!(received.iter().all(|t| t.entry_time > started && t.exit_time <= feed.now().unwrap()));
    }

    #[tokio::test]
    async fn retired_members_do_not_trade() {
        let config = config();
        let feed = feed(&config);
        feed.advance(config.regime.warmup_candles());
        let (generation, handle) = candidates(&config);
        let retired = Generation {
            members: generation
                .borrow()
                .members
                .iter()
                .map(|g| g.with_status(GenomeStatus::Retired))
                .collect(),
            ..Generation::empty()
        };
        generation.send_replace(Arc::new(retired));
        let (tx, _rx) = mpsc::channel(16);
        let mut trader = ShadowTrader::new(Arc::new(config), feed.clone(), handle, tx).unwrap();

        trader.poll(feed.now().unwrap()).await.unwrap();
        feed.advance(200);
        assert_eq!(trader.poll(feed.now().unwrap()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shadow_trades_reach_the_collector() {
        let config = config();
        let feed = feed(&config);
        feed.advance(config.regime.warmup_candles());
        let (_generation, handle) = candidates(&config);
        let store = Arc::new(InMemoryStore::new());
        let collector = Arc::new(TradeCollector::new(store, false, RetryPolicy::from_config(&config.store)));
        let (tx, rx) = mpsc::channel(4096);
        let consumer = tokio::spawn(Arc::clone(&collector).run(rx));

        let mut trader = ShadowTrader::new(Arc::new(config), feed.clone(), handle, tx).unwrap();
        trader.poll(feed.now().unwrap()).await.unwrap();
        feed.advance(200);
        let sent = trader.poll(feed.now().unwrap()).await.unwrap();
        drop(trader);
        consumer.await.unwrap();
        assert_eq!(collector.pending().await, sent);
    }
}
