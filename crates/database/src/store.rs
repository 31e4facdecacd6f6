use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{
    EvaluationWindow, GenomeStatus, MarketRegimeSnapshot, PerformanceRecord, RiskEnvelope,
    TradeOutcome,
};
use serde::{Deserialize, Serialize};
use strategies::StrategyGenome;
use uuid::Uuid;

/// One genome's place in a published generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMember {
    pub strategy_id: Uuid,
    pub status: GenomeStatus,
    /// Present exactly when `status` is `Active`.
    pub envelope: Option<RiskEnvelope>,
    pub fitness: Option<f64>,
}

/// The manifest of a published generation. Members are in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: u32,
    pub published_at: DateTime<Utc>,
    /// Human-readable ranking basis, e.g. `regime:trending` or `aggregate`.
    pub ranked_by: String,
    /// Set when the cycle could not breed and carried the previous members over.
    pub degraded: bool,
    /// The UTC day on which the daily-loss breaker was tripped, if any.
    pub halted_on: Option<NaiveDate>,
    pub members: Vec<GenerationMember>,
}

impl GenerationRecord {
    pub fn member_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.members.iter().map(|m| m.strategy_id)
    }

    pub fn count_with(&self, status: GenomeStatus) -> usize {
        self.members.iter().filter(|m| m.status == status).count()
    }
}

/// Durable storage for genomes, generations, performance, market state, and trades.
///
/// Every write is an idempotent upsert: genomes are keyed by
/// `(id, generation)`, performance records by `(strategy_id, window_start)`,
/// market snapshots by timestamp, and trades by `trade_id`.
#[async_trait]
pub trait PopulationStore: Send + Sync {
    /// Verifies the store can take writes.
    async fn health_check(&self) -> Result<(), DbError>;

    /// Persists the genomes that belong to `generation`, with their current status.
    async fn save_genomes(&self, generation: u32, genomes: &[StrategyGenome]) -> Result<(), DbError>;

    /// The most recent stored version of a genome.
    async fn get_genome(&self, id: Uuid) -> Result<Option<StrategyGenome>, DbError>;

    /// All genomes stored under `generation`, ordered by id.
    async fn genomes_in_generation(&self, generation: u32) -> Result<Vec<StrategyGenome>, DbError>;

    async fn save_generation(&self, record: &GenerationRecord) -> Result<(), DbError>;

    /// The manifest with the highest generation number.
    async fn latest_generation(&self) -> Result<Option<GenerationRecord>, DbError>;

    /// Upserts performance records. An incoming record without a fitness
    /// score keeps the score already stored for the same window.
    async fn upsert_performance(&self, records: &[PerformanceRecord]) -> Result<(), DbError>;

    /// Records whose window lies entirely inside `window`, ordered by
    /// `(strategy_id, window_start)`.
    async fn performance_in_window(
        &self,
        window: EvaluationWindow,
    ) -> Result<Vec<PerformanceRecord>, DbError>;

    async fn save_regime_snapshot(&self, snapshot: &MarketRegimeSnapshot) -> Result<(), DbError>;

    /// The latest snapshot taken at or before `at`.
    async fn latest_regime_snapshot(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<MarketRegimeSnapshot>, DbError>;

    /// Snapshots inside `window`, oldest first.
    async fn regime_snapshots(
        &self,
        window: EvaluationWindow,
    ) -> Result<Vec<MarketRegimeSnapshot>, DbError>;

    /// Stores closed trades. Trades already stored are left untouched.
    async fn save_trades(&self, trades: &[TradeOutcome]) -> Result<(), DbError>;

    /// Trades that closed inside `window`, ordered by exit time.
    async fn trades_in_window(&self, window: EvaluationWindow) -> Result<Vec<TradeOutcome>, DbError>;

    /// Archives genomes dropped from the population under the generation they
    /// last belonged to, marked `Retired`.
    async fn archive_genomes(&self, generation: u32, genomes: &[StrategyGenome]) -> Result<(), DbError> {
        let retired: Vec<StrategyGenome> = genomes
            .iter()
            .map(|g| g.with_status(GenomeStatus::Retired))
            .collect();
        self.save_genomes(generation, &retired).await
    }
}
