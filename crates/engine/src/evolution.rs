use crate::collector::TradeCollector;
use crate::error::EngineError;
use crate::generation::{Generation, GenerationHandle};
use crate::phase::CyclePhase;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::selection::{SelectionSettings, next_population};
use analytics::{PerformanceEngine, dominant_regime};
use analyzer::{FitnessEvaluator, GenomeFitness, RankBasis, Ranking, rank_population};
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{EvaluationWindow, GenomeStatus, PerformanceRecord, RegimeLabel, RiskEnvelope, TradeOutcome};
use database::PopulationStore;
use events::{CircuitBreakerTripped, CycleFailed, EngineEvent, GenerationPublished};
use executor::{ActivationQueue, ExecutionConnector, FlushReport};
use rand::SeedableRng;
use rand::rngs::StdRng;
use risk::{BreakerCheck, DailyLossBreaker, RiskCandidate, RiskGovernor};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use strategies::{StrategyGenome, templates};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// The label given to evaluation windows when regime detection is off or no
/// snapshot has ever been recorded.
pub const FALLBACK_REGIME: RegimeLabel = RegimeLabel::Ranging;

/// What one completed evolution cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub generation: u32,
    pub ranked_by: String,
    pub degraded: bool,
    pub performance_records: usize,
    pub elites: usize,
    pub bred: usize,
    pub active: usize,
    pub candidates: usize,
    pub retired: usize,
    /// Ranked genomes whose score was not backed by enough trades.
    pub insufficient_data: usize,
    pub circuit_breaker_tripped: bool,
    pub best_fitness: f64,
    pub activations: FlushReport,
}

/// What a collection pass between cycles did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectReport {
    pub trades: usize,
    pub breaker: BreakerCheck,
}

/// The evolution cycle state machine.
///
/// The engine owns population membership. Each cycle walks
/// `COLLECTING → EVALUATING → SELECTING → BREEDING → PUBLISHING`; the new
/// generation becomes visible to readers in a single swap, and only after it
/// has been persisted. A failed cycle leaves the previous generation live.
pub struct EvolutionEngine {
    // --- Configuration ---
    config: Arc<Config>,
    selection: SelectionSettings,
    retry: RetryPolicy,

    // --- Collaborators ---
    store: Arc<dyn PopulationStore>,
    connector: Arc<dyn ExecutionConnector>,
    events: broadcast::Sender<EngineEvent>,
    collector: Arc<TradeCollector>,

    // --- Scoring & Risk ---
    evaluator: FitnessEvaluator,
    performance: PerformanceEngine,
    governor: RiskGovernor,
    breaker: DailyLossBreaker,

    // --- Cycle State ---
    rng: StdRng,
    phase: CyclePhase,
    published: watch::Sender<Arc<Generation>>,
    activations: ActivationQueue,
    /// Start of the evaluation window currently being collected.
    window_start: DateTime<Utc>,
    /// Trades collected since the last published cycle.
    window_trades: Vec<TradeOutcome>,
    /// Trades that closed today, for the daily-loss breaker.
    day_trades: Vec<TradeOutcome>,
    fitness: HashMap<Uuid, f64>,
    /// Max drawdown of each member at its last evaluation, for re-allocation.
    drawdowns: HashMap<Uuid, f64>,
}

impl EvolutionEngine {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn PopulationStore>,
        connector: Arc<dyn ExecutionConnector>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let evaluator = FitnessEvaluator::new(config.fitness.clone())?;
        let performance = PerformanceEngine::new(config.fitness.profit_factor_cap);
        let governor = RiskGovernor::new(config.risk.clone())?;
        let breaker = DailyLossBreaker::new(config.risk.max_daily_loss_pct, config.risk.account_equity);
        let retry = RetryPolicy::from_config(&config.store);
        let collector = Arc::new(TradeCollector::new(
            Arc::clone(&store),
            config.features.enable_performance_tracking,
            retry,
        ));
        let rng = match config.evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (published, _) = watch::channel(Arc::new(Generation::empty()));

        Ok(Self {
            selection: SelectionSettings::from_config(&config.evolution),
            retry,
            config,
            store,
            connector,
            events,
            collector,
            evaluator,
            performance,
            governor,
            breaker,
            rng,
            phase: CyclePhase::Collecting,
            published,
            activations: ActivationQueue::new(),
            window_start: DateTime::<Utc>::default(),
            window_trades: Vec::new(),
            day_trades: Vec::new(),
            fitness: HashMap::new(),
            drawdowns: HashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// The trade sink feeding this engine.
    pub fn collector(&self) -> Arc<TradeCollector> {
        Arc::clone(&self.collector)
    }

    /// A receiver for everything the engine announces.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// A read handle on the published generation.
    pub fn subscribe(&self) -> GenerationHandle {
        GenerationHandle::new(self.published.subscribe())
    }

    /// The generation live right now.
    pub fn current(&self) -> Arc<Generation> {
        Arc::clone(&self.published.borrow())
    }

    /// Activation commands still waiting for the execution connector.
    pub fn pending_activations(&self) -> usize {
        self.activations.len()
    }

    /// Restores the last published generation from the store, or seeds and
    /// publishes generation 0 when the store holds none.
    pub async fn bootstrap(&mut self, now: DateTime<Utc>) -> Result<Arc<Generation>, EngineError> {
        let store = self.store.as_ref();
        let latest = retry_with_backoff("latest_generation", self.retry, || store.latest_generation()).await?;

        if let Some(record) = latest {
            let stored = retry_with_backoff("genomes_in_generation", self.retry, || {
                store.genomes_in_generation(record.generation)
            })
            .await?;
            let by_id: HashMap<Uuid, StrategyGenome> = stored.into_iter().map(|g| (g.id(), g)).collect();
            let restored = Generation::from_record(&record, &by_id);

            if !restored.is_empty() {
                tracing::info!(
                    generation = restored.number,
                    members = restored.len(),
                    active = restored.count(GenomeStatus::Active),
                    "Restored last published generation"
                );
                self.fitness = record
                    .members
                    .iter()
                    .filter_map(|m| m.fitness.map(|f| (m.strategy_id, f)))
                    .collect();
                self.breaker = self.breaker.clone().restore(record.halted_on);
                self.window_start = record.published_at;
                self.reload_trades(now).await?;

                let envelopes: Vec<_> = restored
                    .members
                    .iter()
                    .filter_map(|g| restored.envelope(g.id()).cloned())
                    .collect();
                self.activations.stage_generation(&Default::default(), &envelopes);
                let restored = Arc::new(restored);
                self.published.send_replace(Arc::clone(&restored));
                self.flush_activations().await;
                return Ok(restored);
            }
            tracing::warn!(
                generation = record.generation,
                "Stored generation has no loadable members; seeding a fresh population"
            );
            return self.seed(record.generation + 1, now).await;
        }

        self.seed(0, now).await
    }

    async fn seed(&mut self, number: u32, now: DateTime<Utc>) -> Result<Arc<Generation>, EngineError> {
        let genomes = templates::seed_population(self.config.evolution.population_size, &mut self.rng, now)?;
        tracing::info!(size = genomes.len(), generation = number, "Seeding initial population from templates");
        let generation = self
            .publish(
                number,
                genomes,
                &HashMap::new(),
                "seed".to_string(),
                false,
                now,
            )
            .await?;
        self.window_start = now;
        self.flush_activations().await;
        self.emit(EngineEvent::GenerationPublished(GenerationPublished {
            timestamp: now,
            generation: generation.number,
            active: generation.count(GenomeStatus::Active),
            candidates: generation.count(GenomeStatus::Candidate),
            retired: generation.count(GenomeStatus::Retired),
            ranked_by: generation.ranked_by.clone(),
            best_fitness: 0.0,
            degraded: false,
        }));
        Ok(generation)
    }

    /// Reloads trades persisted since the current window opened, so a restart
    /// does not lose them for evaluation or for the daily-loss breaker.
    async fn reload_trades(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.config.features.enable_performance_tracking {
            return Ok(());
        }
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);
        let start = self.window_start.min(day_start);
        if start >= now {
            return Ok(());
        }
        let store = self.store.as_ref();
        let window = EvaluationWindow::new(start, now);
        let trades = retry_with_backoff("trades_in_window", self.retry, || store.trades_in_window(window)).await?;
        self.collector.remember(&trades).await;
        self.window_trades = trades
            .iter()
            .filter(|t| t.exit_time >= self.window_start)
            .cloned()
            .collect();
        self.day_trades = trades
            .into_iter()
            .filter(|t| t.exit_time >= day_start)
            .collect();
        tracing::info!(
            window_trades = self.window_trades.len(),
            day_trades = self.day_trades.len(),
            "Reloaded persisted trade outcomes"
        );
        Ok(())
    }

    /// Pulls new trades from the collector and checks the daily-loss breaker.
    ///
    /// When the breaker trips, the live generation is republished under the
    /// same number with every member retired and all strategies deactivated.
    pub async fn collect(&mut self, now: DateTime<Utc>) -> Result<CollectReport, EngineError> {
        let trades = self.absorb_trades(now).await;
        let breaker = self.breaker.check(&self.day_trades, now);
        match breaker {
            BreakerCheck::Tripped { loss_pct } => self.halt(loss_pct, now).await?,
            BreakerCheck::Armed { .. } if self.current().halted_on.is_some() => self.resume(now).await?,
            _ => {
                self.flush_activations().await;
            }
        }
        Ok(CollectReport { trades, breaker })
    }

    async fn absorb_trades(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = self.dedup_horizon(now);
        let (fresh, stale): (Vec<TradeOutcome>, Vec<TradeOutcome>) = self
            .collector
            .drain()
            .await
            .into_iter()
            .partition(|t| t.exit_time >= horizon);
        if !stale.is_empty() {
            tracing::warn!(
                count = stale.len(),
                horizon = %horizon,
                "Dropping trades that closed before the performance window"
            );
        }
        let count = fresh.len();
        let today = now.date_naive();
        self.day_trades.retain(|t| t.exit_time.date_naive() >= today);
        for trade in fresh {
            if trade.exit_time.date_naive() >= today {
                self.day_trades.push(trade.clone());
            }
            self.window_trades.push(trade);
        }
        if count > 0 {
            tracing::debug!(count, window_trades = self.window_trades.len(), "Absorbed trade outcomes");
        }
        count
    }

    /// Retires the whole live generation for the rest of the day.
    async fn halt(&mut self, loss_pct: Decimal, now: DateTime<Utc>) -> Result<(), EngineError> {
        let current = self.current();
        let retired: Vec<StrategyGenome> = current
            .members
            .iter()
            .map(|g| g.with_status(GenomeStatus::Retired))
            .collect();
        let halted = Arc::new(Generation {
            number: current.number,
            published_at: current.published_at,
            members: retired,
            envelopes: BTreeMap::new(),
            ranked_by: current.ranked_by.clone(),
            degraded: current.degraded,
            halted_on: self.breaker.halted_on(),
        });

        // Stop trading before anything is written.
        self.published.send_replace(Arc::clone(&halted));
        self.activations.stage_generation(&current.active_ids(), &[]);
        self.flush_activations().await;
        self.emit(EngineEvent::CircuitBreakerTripped(CircuitBreakerTripped {
            timestamp: now,
            loss_pct,
            limit_pct: self.config.risk.max_daily_loss_pct,
            retired: current.count(GenomeStatus::Active),
        }));

        let record = halted.to_record(&self.fitness);
        let store = self.store.as_ref();
        retry_with_backoff("save_genomes", self.retry, || store.save_genomes(halted.number, &halted.members))
            .await?;
        retry_with_backoff("save_generation", self.retry, || store.save_generation(&record)).await?;
        Ok(())
    }

    /// Reactivates a generation halted on an earlier day, under the same
    /// number, once the breaker has re-armed.
    async fn resume(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let current = self.current();
        let (members, envelopes, ordered_envelopes) = self.allocate(&current.members, now);
        let resumed = Generation {
            number: current.number,
            published_at: current.published_at,
            members,
            envelopes,
            ranked_by: current.ranked_by.clone(),
            degraded: current.degraded,
            halted_on: None,
        };

        let record = resumed.to_record(&self.fitness);
        let store = self.store.as_ref();
        retry_with_backoff("save_genomes", self.retry, || store.save_genomes(resumed.number, &resumed.members))
            .await?;
        retry_with_backoff("save_generation", self.retry, || store.save_generation(&record)).await?;

        let resumed = Arc::new(resumed);
        self.published.send_replace(Arc::clone(&resumed));
        self.activations.stage_generation(&current.active_ids(), &ordered_envelopes);
        tracing::info!(
            generation = resumed.number,
            active = resumed.count(GenomeStatus::Active),
            "Daily loss breaker re-armed; generation resumed"
        );
        self.flush_activations().await;
        Ok(())
    }

    /// Runs one full evolution cycle and publishes the next generation.
    ///
    /// On failure the previous generation stays live, the collected trades are
    /// kept for the next attempt, and a `CycleFailed` event is emitted.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let result = self.cycle(now).await;
        self.phase = CyclePhase::Collecting;
        match result {
            Ok(report) => {
                tracing::info!(
                    generation = report.generation,
                    ranked_by = %report.ranked_by,
                    active = report.active,
                    candidates = report.candidates,
                    retired = report.retired,
                    best_fitness = report.best_fitness,
                    degraded = report.degraded,
                    "Evolution cycle complete"
                );
                Ok(report)
            }
            Err(e) => {
                let generation = self.current().number;
                tracing::error!(generation, error = %e, "Evolution cycle failed; previous generation stays live");
                self.emit(EngineEvent::CycleFailed(CycleFailed {
                    timestamp: now,
                    generation: generation + 1,
                    reason: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    async fn cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let current = self.current();
        if current.is_empty() {
            return Err(EngineError::Invariant(
                "no published generation; bootstrap must run before the first cycle".to_string(),
            ));
        }

        // --- 1. COLLECTING ---
        self.enter(CyclePhase::Collecting, current.number);
        self.absorb_trades(now).await;
        let performance_records = self.record_window(&current, now).await?;

        // --- 2. EVALUATING ---
        self.enter(CyclePhase::Evaluating, current.number);
        let window = EvaluationWindow::trailing(now, self.config.evolution.performance_window_days);
        let store = self.store.as_ref();
        let snapshot = retry_with_backoff("performance_in_window", self.retry, || {
            store.performance_in_window(window)
        })
        .await?;
        let evaluated = self.evaluator.evaluate_population(&current.members, &snapshot);

        let breaker = self.breaker.check(&self.day_trades, now);
        let tripped = match breaker {
            BreakerCheck::Tripped { loss_pct } => Some(loss_pct),
            _ => None,
        };

        // --- 3. SELECTING ---
        self.enter(CyclePhase::Selecting, current.number);
        let regime = self.ranking_regime(now).await?;
        let ranking = rank_population(&evaluated, regime, self.config.fitness.min_regime_population);
        let ranked_by = match ranking.basis {
            RankBasis::Regime(label) => label.as_str().to_string(),
            RankBasis::Aggregate => "aggregate".to_string(),
        };

        // --- 4. BREEDING ---
        self.enter(CyclePhase::Breeding, current.number);
        let offspring = next_population(&ranking, &current.members, &self.selection, &mut self.rng, now)?;
        let degraded = offspring.degraded;
        let elites = offspring.elites.len();
        let bred = offspring.children.len();
        let members = offspring.into_members();

        // --- 5. PUBLISHING ---
        self.enter(CyclePhase::Publishing, current.number);
        let by_id: HashMap<Uuid, &GenomeFitness> = evaluated.iter().map(|f| (f.strategy_id, f)).collect();
        let generation = self
            .publish(current.number + 1, members, &by_id, ranked_by.clone(), degraded, now)
            .await?;

        self.window_start = now;
        self.window_trades.retain(|t| t.exit_time >= now);
        self.collector.forget_before(self.dedup_horizon(now)).await;
        let best_fitness = ranking.ranked.first().map_or(0.0, |r| r.score.value);
        let activations = self.flush_activations().await;

        if let Some(loss_pct) = tripped {
            self.emit(EngineEvent::CircuitBreakerTripped(CircuitBreakerTripped {
                timestamp: now,
                loss_pct,
                limit_pct: self.config.risk.max_daily_loss_pct,
                retired: current.count(GenomeStatus::Active),
            }));
        }
        self.emit(EngineEvent::GenerationPublished(GenerationPublished {
            timestamp: now,
            generation: generation.number,
            active: generation.count(GenomeStatus::Active),
            candidates: generation.count(GenomeStatus::Candidate),
            retired: generation.count(GenomeStatus::Retired),
            ranked_by: ranked_by.clone(),
            best_fitness,
            degraded,
        }));

        Ok(CycleReport {
            generation: generation.number,
            ranked_by,
            degraded,
            performance_records,
            elites,
            bred,
            active: generation.count(GenomeStatus::Active),
            candidates: generation.count(GenomeStatus::Candidate),
            retired: generation.count(GenomeStatus::Retired),
            insufficient_data: insufficient_count(&ranking),
            circuit_breaker_tripped: tripped.is_some(),
            best_fitness,
            activations,
        })
    }

    /// Trades closing before this can no longer be told apart from ones
    /// already evaluated.
    fn dedup_horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let trailing = EvaluationWindow::trailing(now, self.config.evolution.performance_window_days).start;
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |d| d.and_utc());
        trailing.min(day_start)
    }

    fn enter(&mut self, phase: CyclePhase, generation: u32) {
        self.phase = phase;
        tracing::info!(generation, phase = %phase, "Evolution cycle phase");
    }

    /// Turns the trades of the current window into one performance record per
    /// member, tagged with the regime that dominated the window.
    ///
    /// The window always starts at the last publication, so a retried cycle
    /// overwrites the records of a failed attempt. Trades reported late are
    /// attributed to the window they were collected in; trades closing at or
    /// after `now` wait for the next one.
    async fn record_window(&mut self, current: &Generation, now: DateTime<Utc>) -> Result<usize, EngineError> {
        if self.window_start >= now {
            tracing::debug!("Empty evaluation window, no performance recorded");
            return Ok(0);
        }
        let window = EvaluationWindow::new(self.window_start, now);
        let regime = self.window_regime(window).await?;

        let members: HashSet<Uuid> = current.members.iter().map(StrategyGenome::id).collect();
        let strays = self
            .window_trades
            .iter()
            .filter(|t| !members.contains(&t.strategy_id))
            .count();
        if strays > 0 {
            tracing::debug!(strays, "Ignoring trades of strategies outside the live generation");
        }
        let late = self.window_trades.iter().filter(|t| t.exit_time < window.start).count();
        if late > 0 {
            tracing::info!(late, window_start = %window.start, "Attributing late trades to the current window");
        }

        let closed: Vec<TradeOutcome> = self
            .window_trades
            .iter()
            .filter(|t| t.exit_time < now)
            .cloned()
            .collect();
        let records = current
            .members
            .iter()
            .map(|g| {
                self.performance
                    .calculate_attributed(g.id(), window, regime, &closed)
                    .map(|record| self.evaluator.annotate(&record))
            })
            .collect::<Result<Vec<PerformanceRecord>, _>>()?;

        let store = self.store.as_ref();
        retry_with_backoff("upsert_performance", self.retry, || store.upsert_performance(&records)).await?;
        tracing::info!(
            records = records.len(),
            regime = %regime,
            window_start = %window.start,
            "Recorded window performance"
        );
        Ok(records.len())
    }

    async fn window_regime(&self, window: EvaluationWindow) -> Result<RegimeLabel, EngineError> {
        if !self.config.features.enable_market_regime_detection {
            return Ok(FALLBACK_REGIME);
        }
        let store = self.store.as_ref();
        let snapshots = retry_with_backoff("regime_snapshots", self.retry, || store.regime_snapshots(window)).await?;
        let carried = retry_with_backoff("latest_regime_snapshot", self.retry, || {
            store.latest_regime_snapshot(window.start)
        })
        .await?
        .map(|s| s.regime_label);
        Ok(dominant_regime(&snapshots, window, carried).unwrap_or(FALLBACK_REGIME))
    }

    /// The regime the population is ranked in: the latest committed label.
    async fn ranking_regime(&self, now: DateTime<Utc>) -> Result<Option<RegimeLabel>, EngineError> {
        if !self.config.features.enable_market_regime_detection {
            return Ok(None);
        }
        let store = self.store.as_ref();
        let latest = retry_with_backoff("latest_regime_snapshot", self.retry, || {
            store.latest_regime_snapshot(now)
        })
        .await?;
        Ok(latest.map(|s| s.regime_label))
    }

    /// Applies the risk governor, persists and then swaps in a new generation.
    ///
    /// `members` must be in rank order. Nothing becomes visible until every
    /// write has succeeded.
    async fn publish(
        &mut self,
        number: u32,
        members: Vec<StrategyGenome>,
        fitness: &HashMap<Uuid, &GenomeFitness>,
        ranked_by: String,
        degraded: bool,
        now: DateTime<Utc>,
    ) -> Result<Arc<Generation>, EngineError> {
        self.check_invariants(&members)?;
        let previous = self.current();

        self.drawdowns = fitness
            .iter()
            .map(|(id, f)| (*id, f.aggregate.max_drawdown_pct))
            .collect();
        let (members, envelopes, ordered_envelopes) = self.allocate(&members, now);

        let next = Generation {
            number,
            published_at: now,
            members,
            envelopes,
            ranked_by,
            degraded,
            halted_on: self.breaker.halted_on(),
        };
        let next_fitness: HashMap<Uuid, f64> = fitness
            .iter()
            .map(|(id, f)| (*id, f.aggregate.value))
            .collect();
        let record = next.to_record(&next_fitness);

        let kept: HashSet<Uuid> = next.members.iter().map(StrategyGenome::id).collect();
        let dropped: Vec<StrategyGenome> = previous
            .members
            .iter()
            .filter(|g| !kept.contains(&g.id()))
            .cloned()
            .collect();

        let store = self.store.as_ref();
        retry_with_backoff("save_genomes", self.retry, || store.save_genomes(number, &next.members)).await?;
        if !dropped.is_empty() {
            retry_with_backoff("archive_genomes", self.retry, || {
                store.archive_genomes(previous.number, &dropped)
            })
            .await?;
        }
        retry_with_backoff("save_generation", self.retry, || store.save_generation(&record)).await?;

        let next = Arc::new(next);
        self.published.send_replace(Arc::clone(&next));
        self.fitness = next_fitness;
        self.activations
            .stage_generation(&previous.active_ids(), &ordered_envelopes);
        tracing::info!(
            generation = number,
            members = next.len(),
            retired = dropped.len(),
            "Generation published"
        );
        Ok(next)
    }

    /// Runs members through the risk governor in order and stamps each with
    /// its resulting status.
    fn allocate(
        &self,
        members: &[StrategyGenome],
        now: DateTime<Utc>,
    ) -> (Vec<StrategyGenome>, BTreeMap<Uuid, RiskEnvelope>, Vec<RiskEnvelope>) {
        let halted = self.breaker.is_halted(now);
        let candidates: Vec<RiskCandidate> = members
            .iter()
            .map(|genome| RiskCandidate {
                genome,
                drawdown_pct: self.drawdowns.get(&genome.id()).copied().unwrap_or(0.0),
            })
            .collect();
        let allocations = self.governor.allocate(&candidates, halted, now);

        let mut envelopes = BTreeMap::new();
        let mut ordered = Vec::new();
        let members = members
            .iter()
            .zip(allocations)
            .map(|(genome, allocation)| {
                if let Some(envelope) = allocation.envelope {
                    ordered.push(envelope.clone());
                    envelopes.insert(allocation.strategy_id, envelope);
                }
                genome.with_status(allocation.status)
            })
            .collect();
        (members, envelopes, ordered)
    }

    fn check_invariants(&self, members: &[StrategyGenome]) -> Result<(), EngineError> {
        let max = self.config.evolution.population_size;
        if members.len() > max {
            return Err(EngineError::Invariant(format!(
                "population of {} exceeds population_size {max}",
                members.len()
            )));
        }
        let mut ids = HashSet::new();
        for genome in members {
            if !ids.insert(genome.id()) {
                return Err(EngineError::Invariant(format!(
                    "genome {} appears twice in the generation",
                    genome.id()
                )));
            }
            genome
                .validate(Some(self.config.evolution.max_strategy_complexity))
                .map_err(|e| EngineError::Invariant(format!("genome {} failed validation: {e}", genome.id())))?;
        }
        Ok(())
    }

    async fn flush_activations(&mut self) -> FlushReport {
        if self.activations.is_empty() {
            return FlushReport::default();
        }
        let report = self.activations.flush(self.connector.as_ref()).await;
        tracing::debug!(
            delivered = report.delivered,
            rejected = report.rejected,
            pending = report.pending,
            "Activation queue flushed"
        );
        report
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No event subscribers");
        }
    }
}

fn insufficient_count(ranking: &Ranking) -> usize {
    ranking.ranked.len() - ranking.sufficient_count()
}
