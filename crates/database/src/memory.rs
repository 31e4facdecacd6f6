use crate::error::DbError;
use crate::store::{GenerationRecord, PopulationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{EvaluationWindow, MarketRegimeSnapshot, PerformanceRecord, TradeOutcome};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use strategies::StrategyGenome;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Collections {
    genomes: BTreeMap<(u32, Uuid), StrategyGenome>,
    generations: BTreeMap<u32, GenerationRecord>,
    performance: BTreeMap<(Uuid, DateTime<Utc>), PerformanceRecord>,
    snapshots: BTreeMap<DateTime<Utc>, MarketRegimeSnapshot>,
    trades: BTreeMap<Uuid, TradeOutcome>,
}

/// A process-local [`PopulationStore`] for simulation runs and tests.
///
/// Failures can be injected to exercise the retry and fallback paths.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Collections>,
    unavailable: AtomicBool,
    failures_remaining: AtomicU32,
    /// Remaining injected failures per operation name.
    failing_operations: Mutex<HashMap<String, u32>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with [`DbError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` operations fail with [`DbError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` calls of one operation fail, leaving the others
    /// untouched.
    pub fn fail_operation(&self, operation: &str, count: u32) {
        if let Ok(mut failing) = self.failing_operations.lock() {
            failing.insert(operation.to_string(), count);
        }
    }

    fn check(&self, operation: &str) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable(format!("{operation}: store offline")));
        }
        let consumed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(DbError::Unavailable(format!("{operation}: injected failure")));
        }
        if let Ok(mut failing) = self.failing_operations.lock() {
            if let Some(remaining) = failing.get_mut(operation).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(DbError::Unavailable(format!("{operation}: injected failure")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PopulationStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), DbError> {
        self.check("health_check")
    }

    async fn save_genomes(&self, generation: u32, genomes: &[StrategyGenome]) -> Result<(), DbError> {
        self.check("save_genomes")?;
        let mut data = self.data.write().await;
        for genome in genomes {
            data.genomes.insert((generation, genome.id()), genome.clone());
        }
        Ok(())
    }

    async fn get_genome(&self, id: Uuid) -> Result<Option<StrategyGenome>, DbError> {
        self.check("get_genome")?;
        let data = self.data.read().await;
        Ok(data
            .genomes
            .iter()
            .rev()
            .find(|((_, genome_id), _)| *genome_id == id)
            .map(|(_, genome)| genome.clone()))
    }

    async fn genomes_in_generation(&self, generation: u32) -> Result<Vec<StrategyGenome>, DbError> {
        self.check("genomes_in_generation")?;
        let data = self.data.read().await;
        Ok(data
            .genomes
            .range((generation, Uuid::nil())..=(generation, Uuid::from_u128(u128::MAX)))
            .map(|(_, genome)| genome.clone())
            .collect())
    }

    async fn save_generation(&self, record: &GenerationRecord) -> Result<(), DbError> {
        self.check("save_generation")?;
        self.data
            .write()
            .await
            .generations
            .insert(record.generation, record.clone());
        Ok(())
    }

    async fn latest_generation(&self) -> Result<Option<GenerationRecord>, DbError> {
        self.check("latest_generation")?;
        let data = self.data.read().await;
        Ok(data.generations.values().next_back().cloned())
    }

    async fn upsert_performance(&self, records: &[PerformanceRecord]) -> Result<(), DbError> {
        self.check("upsert_performance")?;
        let mut data = self.data.write().await;
        for record in records {
            let key = (record.strategy_id, record.window_start);
            let fitness_score = record
                .fitness_score
                .or_else(|| data.performance.get(&key).and_then(|r| r.fitness_score));
            data.performance.insert(
                key,
                PerformanceRecord {
                    fitness_score,
                    ..record.clone()
                },
            );
        }
        Ok(())
    }

    async fn performance_in_window(
        &self,
        window: EvaluationWindow,
    ) -> Result<Vec<PerformanceRecord>, DbError> {
        self.check("performance_in_window")?;
        let data = self.data.read().await;
        Ok(data
            .performance
            .values()
            .filter(|r| r.window_start >= window.start && r.window_end <= window.end)
            .cloned()
            .collect())
    }

    async fn save_regime_snapshot(&self, snapshot: &MarketRegimeSnapshot) -> Result<(), DbError> {
        self.check("save_regime_snapshot")?;
        self.data
            .write()
            .await
            .snapshots
            .entry(snapshot.timestamp)
            .or_insert(*snapshot);
        Ok(())
    }

    async fn latest_regime_snapshot(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<MarketRegimeSnapshot>, DbError> {
        self.check("latest_regime_snapshot")?;
        let data = self.data.read().await;
        Ok(data.snapshots.range(..=at).next_back().map(|(_, s)| *s))
    }

    async fn regime_snapshots(
        &self,
        window: EvaluationWindow,
    ) -> Result<Vec<MarketRegimeSnapshot>, DbError> {
        self.check("regime_snapshots")?;
        if window.start >= window.end {
            return Ok(Vec::new());
        }
        let data = self.data.read().await;
        Ok(data
            .snapshots
            .range(window.start..window.end)
            .map(|(_, s)| *s)
            .collect())
    }

    async fn save_trades(&self, trades: &[TradeOutcome]) -> Result<(), DbError> {
        self.check("save_trades")?;
        let mut data = self.data.write().await;
        for trade in trades {
            data.trades.entry(trade.trade_id).or_insert_with(|| trade.clone());
        }
        Ok(())
    }

    async fn trades_in_window(&self, window: EvaluationWindow) -> Result<Vec<TradeOutcome>, DbError> {
        self.check("trades_in_window")?;
        let data = self.data.read().await;
        let mut trades: Vec<TradeOutcome> = data
            .trades
            .values()
            .filter(|t| window.contains(t.exit_time))
            .cloned()
            .collect();
        trades.sort_by(|a, b| a.exit_time.cmp(&b.exit_time).then(a.trade_id.cmp(&b.trade_id)));
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GenerationMember;
    use chrono::{Duration, TimeZone};
    use core_types::{GenomeStatus, OrderSide, RegimeLabel};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;
    use strategies::templates;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn record(strategy_id: Uuid, day: i64, fitness: Option<f64>) -> PerformanceRecord {
        let start = t0() + Duration::days(day);
        PerformanceRecord {
            strategy_id,
            window_start: start,
            window_end: start + Duration::days(1),
            regime_label: RegimeLabel::Ranging,
            trade_count: 7,
            win_rate: 0.57,
            profit_factor: 1.4,
            max_drawdown_pct: 3.0,
            sharpe_like_ratio: 0.8,
            gross_profit: 140.0,
            gross_loss: 100.0,
            fitness_score: fitness,
        }
    }

    #[tokio::test]
    async fn genomes_round_trip_unchanged() {
        let store = InMemoryStore::new();
        let mut rng = StdRng::seed_from_u64(3);
        let population = templates::seed_population(4, &mut rng, t0()).unwrap();
        store.save_genomes(0, &population).await.unwrap();

        let loaded = store.get_genome(population[2].id()).await.unwrap().unwrap();
        assert_eq!(loaded, population[2]);
        assert_eq!(store.genomes_in_generation(0).await.unwrap().len(), 4);
        assert!(store.genomes_in_generation(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn archived_genome_reads_back_retired() {
        let store = InMemoryStore::new();
        let mut rng = StdRng::seed_from_u64(4);
        let population = templates::seed_population(2, &mut rng, t0()).unwrap();
        store.save_genomes(3, &population).await.unwrap();
        store.archive_genomes(3, &population[..1]).await.unwrap();

        let archived = store.get_genome(population[0].id()).await.unwrap().unwrap();
        assert_eq!(archived.status(), GenomeStatus::Retired);
        assert_eq!(archived.parameters(), population[0].parameters());
    }

    #[tokio::test]
    async fn performance_upsert_keeps_existing_fitness() {
        let store = InMemoryStore::new();
        let id = Uuid::from_u128(9);
        store.upsert_performance(&[record(id, 0, Some(0.7))]).await.unwrap();
        store.upsert_performance(&[record(id, 0, None)]).await.unwrap();

        let window = EvaluationWindow::new(t0(), t0() + Duration::days(7));
        let stored = store.performance_in_window(window).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fitness_score, Some(0.7));
    }

    #[tokio::test]
    async fn window_query_excludes_straddling_records() {
        let store = InMemoryStore::new();
        let id = Uuid::from_u128(1);
        store
            .upsert_performance(&[record(id, 0, None), record(id, 1, None), record(id, 2, None)])
            .await
            .unwrap();
        let window = EvaluationWindow::new(t0() + Duration::days(1), t0() + Duration::hours(60));
        let stored = store.performance_in_window(window).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].window_start, t0() + Duration::days(1));
    }

    #[tokio::test]
    async fn latest_generation_wins() {
        let store = InMemoryStore::new();
        for generation in [0, 2, 1] {
            store
                .save_generation(&GenerationRecord {
                    generation,
                    published_at: t0(),
                    ranked_by: "aggregate".to_string(),
                    degraded: false,
                    halted_on: None,
                    members: vec![GenerationMember {
                        strategy_id: Uuid::from_u128(generation as u128),
                        status: GenomeStatus::Candidate,
                        envelope: None,
                        fitness: None,
                    }],
                })
                .await
                .unwrap();
        }
        assert_eq!(store.latest_generation().await.unwrap().unwrap().generation, 2);
    }

    #[tokio::test]
    async fn trades_are_stored_once() {
        let store = InMemoryStore::new();
        let trade = TradeOutcome {
            trade_id: Uuid::from_u128(5),
            strategy_id: Uuid::from_u128(6),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            entry_time: t0(),
            exit_time: t0() + Duration::hours(2),
            realized_pnl: dec!(12.5),
            return_pct: 1.25,
        };
        store.save_trades(&[trade.clone(), trade.clone()]).await.unwrap();
        let window = EvaluationWindow::new(t0(), t0() + Duration::days(1));
        assert_eq!(store.trades_in_window(window).await.unwrap(), vec![trade]);
    }

    #[tokio::test]
    async fn latest_snapshot_is_at_or_before() {
        let store = InMemoryStore::new();
        for (h, label) in [(0, RegimeLabel::Ranging), (4, RegimeLabel::Volatile)] {
            store
                .save_regime_snapshot(&MarketRegimeSnapshot {
                    timestamp: t0() + Duration::hours(h),
                    regime_label: label,
                    volatility_index: 1.0,
                    trend_strength: 0.2,
                })
                .await
                .unwrap();
        }
        let at_two = store.latest_regime_snapshot(t0() + Duration::hours(2)).await.unwrap();
        assert_eq!(at_two.map(|s| s.regime_label), Some(RegimeLabel::Ranging));
        assert!(store.latest_regime_snapshot(t0() - Duration::hours(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_run_out() {
        let store = InMemoryStore::new();
        store.fail_next(2);
        assert!(store.health_check().await.unwrap_err().is_transient());
        assert!(store.health_check().await.is_err());
        assert!(store.health_check().await.is_ok());

        store.set_unavailable(true);
        assert!(matches!(store.latest_generation().await, Err(DbError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.latest_generation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failures_can_target_one_operation() {
        let store = InMemoryStore::new();
        store.fail_operation("latest_generation", 1);
        assert!(store.health_check().await.is_ok());
        assert!(store.latest_generation().await.is_err());
        assert!(store.latest_generation().await.is_ok());
    }
}
