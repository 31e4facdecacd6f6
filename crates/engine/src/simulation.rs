use crate::error::EngineError;
use crate::evolution::{CycleReport, EvolutionEngine};
use crate::sampler::RegimeSampler;
use crate::shadow::shadow_notional;
use api_client::{ReplayFeed, SyntheticMarket, timeframe_duration};
use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::Config;
use core_types::RegimeLabel;
use database::InMemoryStore;
use events::EngineEvent;
use executor::PaperConnector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use strategies::{SimulationSettings, simulate};
use tokio::sync::broadcast;

/// Parameters of an offline evolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    pub cycles: usize,
    /// Candles replayed between two evolution cycles.
    pub candles_per_cycle: usize,
    pub seed: u64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            cycles: 10,
            candles_per_cycle: 24,
            seed: 42,
        }
    }
}

/// One row of the simulation summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub cycle: usize,
    pub at: DateTime<Utc>,
    pub regime: Option<RegimeLabel>,
    pub trades: usize,
    pub report: CycleReport,
}

/// A deterministic offline evolution loop.
///
/// A synthetic market is replayed through a [`ReplayFeed`]. Between cycles
/// every live genome trades the new candles through the candle-replay
/// simulator: active genomes with their envelope, candidates shadow-trade at
/// the minimum position. Their outcomes feed the same collection path as
/// live trades. Store and execution are in memory.
pub struct Simulation {
    config: Arc<Config>,
    options: SimulationOptions,
    feed: Arc<ReplayFeed>,
    store: Arc<InMemoryStore>,
    connector: Arc<PaperConnector>,
    engine: EvolutionEngine,
    sampler: RegimeSampler,
    rng: StdRng,
    warmup: usize,
}

impl Simulation {
    pub fn new(config: Config, options: SimulationOptions) -> Result<Self, EngineError> {
        let mut config = config;
        config.evolution.seed = Some(options.seed);
        let config = Arc::new(config);

        let interval = timeframe_duration(&config.market.timeframe)?;
        let warmup = config.regime.warmup_candles();
        let market = SyntheticMarket {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            interval,
            count: warmup + options.cycles * options.candles_per_cycle,
            start_price: 30_000.0,
            phase_length: options.candles_per_cycle.max(1) * 3,
        };
        let feed = Arc::new(ReplayFeed::synthetic(&market, options.seed, config.regime.clone()));
        let store = Arc::new(InMemoryStore::new());
        let connector = Arc::new(PaperConnector::new());
        let (events, _) = broadcast::channel(256);

        let engine = EvolutionEngine::new(
            Arc::clone(&config),
            store.clone(),
            connector.clone(),
            events.clone(),
        )?;
        let sampler = RegimeSampler::new(&config, feed.clone(), store.clone(), events)?;

        Ok(Self {
            rng: StdRng::seed_from_u64(options.seed.wrapping_add(1)),
            config,
            options,
            feed,
            store,
            connector,
            engine,
            sampler,
            warmup,
        })
    }

    pub fn engine(&self) -> &EvolutionEngine {
        &self.engine
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.store)
    }

    pub fn connector(&self) -> Arc<PaperConnector> {
        Arc::clone(&self.connector)
    }

    /// Subscribes to the engine's events. Call before [`Simulation::run`].
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.engine.events()
    }

    /// Runs every cycle and returns one summary row per cycle.
    ///
    /// Stops early when the candle history runs out.
    pub async fn run(&mut self) -> Result<Vec<CycleSummary>, EngineError> {
        self.feed.advance(self.warmup);
        let start = self.clock();
        self.engine.bootstrap(start).await?;
        self.sampler.sample_once(start).await?;

        let mut summaries = Vec::with_capacity(self.options.cycles);
        for cycle in 1..=self.options.cycles {
            if self.feed.is_exhausted() {
                tracing::warn!(cycle, "Candle history exhausted, stopping simulation");
                break;
            }
            let trades = self.step().await?;
            let now = self.clock();
            self.engine.collect(now).await?;
            let report = self.engine.run_cycle(now).await?;
            summaries.push(CycleSummary {
                cycle,
                at: now,
                regime: self.sampler.classifier().current(),
                trades,
                report,
            });
        }
        Ok(summaries)
    }

    /// The start of the next, not yet visible candle.
    fn clock(&self) -> DateTime<Utc> {
        self.feed
            .now()
            .map_or_else(Utc::now, |close| close + Duration::milliseconds(1))
    }

    /// Replays one cycle of candles and trades them with every live genome.
    async fn step(&mut self) -> Result<usize, EngineError> {
        let window_start = self.clock();
        for _ in 0..self.options.candles_per_cycle {
            if self.feed.is_exhausted() {
                break;
            }
            self.feed.advance(1);
            let now = self.clock();
            self.sampler.sample_once(now).await?;
        }

        let visible = self.feed.visible();
        let from = visible
            .len()
            .saturating_sub(self.options.candles_per_cycle + self.warmup);
        let candles = &visible[from..];

        let generation = self.engine.current();
        let mut trades = Vec::new();
        for genome in &generation.members {
            let Some(notional) = shadow_notional(&self.config, &generation, genome) else {
                continue;
            };
            let settings = SimulationSettings {
                symbol: self.config.market.symbol.clone(),
                notional,
                trade_from: Some(window_start),
            };
            trades.extend(simulate(genome, candles, &settings, &mut self.rng)?);
        }

        let count = trades.len();
        self.engine.collector().record(trades).await?;
        tracing::debug!(generation = generation.number, trades = count, "Simulated window trades");
        Ok(count)
    }
}
