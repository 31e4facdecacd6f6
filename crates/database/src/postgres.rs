use crate::error::DbError;
use crate::store::{GenerationRecord, PopulationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::Collections;
use core_types::{
    EvaluationWindow, MarketRegimeSnapshot, OrderSide, PerformanceRecord, RegimeLabel, TradeOutcome,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use strategies::StrategyGenome;
use uuid::Uuid;

const PROBE_TABLE: &str = "store_probe";

/// A [`PopulationStore`] backed by PostgreSQL.
///
/// Table names come from the configured [`Collections`]; the bundled
/// migrations create the default names.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    tables: Collections,
    probe_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, tables: Collections, probe_timeout: Duration) -> Self {
        Self {
            pool,
            tables,
            probe_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn probe(&self) -> Result<(), DbError> {
        let id = Uuid::new_v4();
        sqlx::query(&format!(
            "INSERT INTO {PROBE_TABLE} (id, created_at) VALUES ($1, NOW())"
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!("DELETE FROM {PROBE_TABLE} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("SELECT 1 FROM {} LIMIT 1", self.tables.strategies))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct GenomeRow {
    genome: Json<StrategyGenome>,
}

#[derive(FromRow)]
struct ManifestRow {
    manifest: Json<GenerationRecord>,
}

#[derive(FromRow)]
struct PerformanceRow {
    strategy_id: Uuid,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    regime_label: String,
    trade_count: i32,
    win_rate: f64,
    profit_factor: f64,
    max_drawdown_pct: f64,
    sharpe_like_ratio: f64,
    gross_profit: f64,
    gross_loss: f64,
    fitness_score: Option<f64>,
}

impl TryFrom<PerformanceRow> for PerformanceRecord {
    type Error = DbError;

    fn try_from(row: PerformanceRow) -> Result<Self, Self::Error> {
        Ok(PerformanceRecord {
            strategy_id: row.strategy_id,
            window_start: row.window_start,
            window_end: row.window_end,
            regime_label: parse_regime(&row.regime_label)?,
            trade_count: u32::try_from(row.trade_count)
                .map_err(|_| DbError::Corrupt(format!("negative trade_count {}", row.trade_count)))?,
            win_rate: row.win_rate,
            profit_factor: row.profit_factor,
            max_drawdown_pct: row.max_drawdown_pct,
            sharpe_like_ratio: row.sharpe_like_ratio,
            gross_profit: row.gross_profit,
            gross_loss: row.gross_loss,
            fitness_score: row.fitness_score,
        })
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    timestamp: DateTime<Utc>,
    regime_label: String,
    volatility_index: f64,
    trend_strength: f64,
}

impl TryFrom<SnapshotRow> for MarketRegimeSnapshot {
    type Error = DbError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(MarketRegimeSnapshot {
            timestamp: row.timestamp,
            regime_label: parse_regime(&row.regime_label)?,
            volatility_index: row.volatility_index,
            trend_strength: row.trend_strength,
        })
    }
}

#[derive(FromRow)]
struct TradeRow {
    trade_id: Uuid,
    strategy_id: Uuid,
    symbol: String,
    side: String,
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    realized_pnl: Decimal,
    return_pct: f64,
}

impl TryFrom<TradeRow> for TradeOutcome {
    type Error = DbError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let side = match row.side.as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            other => return Err(DbError::Corrupt(format!("unknown order side '{other}'"))),
        };
        Ok(TradeOutcome {
            trade_id: row.trade_id,
            strategy_id: row.strategy_id,
            symbol: row.symbol,
            side,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            realized_pnl: row.realized_pnl,
            return_pct: row.return_pct,
        })
    }
}

fn parse_regime(label: &str) -> Result<RegimeLabel, DbError> {
    label
        .parse()
        .map_err(|e: core_types::CoreError| DbError::Corrupt(e.to_string()))
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn generation_key(generation: u32) -> Result<i32, DbError> {
    i32::try_from(generation)
        .map_err(|_| DbError::Corrupt(format!("generation {generation} out of range")))
}

#[async_trait]
impl PopulationStore for PgStore {
    async fn health_check(&self) -> Result<(), DbError> {
        match tokio::time::timeout(self.probe_timeout, self.probe()).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Unavailable(format!(
                "probe did not complete within {:?}",
                self.probe_timeout
            ))),
        }
    }

    async fn save_genomes(&self, generation: u32, genomes: &[StrategyGenome]) -> Result<(), DbError> {
        let key = generation_key(generation)?;
        let sql = format!(
            r#"
            INSERT INTO {} (id, generation, status, created_at, genome)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id, generation) DO UPDATE SET
                status = EXCLUDED.status,
                genome = EXCLUDED.genome
            "#,
            self.tables.strategies
        );
        let mut tx = self.pool.begin().await?;
        for genome in genomes {
            sqlx::query(&sql)
                .bind(genome.id())
                .bind(key)
                .bind(genome.status().as_str())
                .bind(genome.created_at())
                .bind(Json(genome))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::debug!(generation, count = genomes.len(), "Saved genomes");
        Ok(())
    }

    async fn get_genome(&self, id: Uuid) -> Result<Option<StrategyGenome>, DbError> {
        let row: Option<GenomeRow> = sqlx::query_as(&format!(
            "SELECT genome FROM {} WHERE id = $1 ORDER BY generation DESC LIMIT 1",
            self.tables.strategies
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.genome.0))
    }

    async fn genomes_in_generation(&self, generation: u32) -> Result<Vec<StrategyGenome>, DbError> {
        let rows: Vec<GenomeRow> = sqlx::query_as(&format!(
            "SELECT genome FROM {} WHERE generation = $1 ORDER BY id",
            self.tables.strategies
        ))
        .bind(generation_key(generation)?)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.genome.0).collect())
    }

    async fn save_generation(&self, record: &GenerationRecord) -> Result<(), DbError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (generation, published_at, manifest)
            VALUES ($1, $2, $3)
            ON CONFLICT (generation) DO UPDATE SET
                published_at = EXCLUDED.published_at,
                manifest = EXCLUDED.manifest
            "#,
            self.tables.generations
        ))
        .bind(generation_key(record.generation)?)
        .bind(record.published_at)
        .bind(Json(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_generation(&self) -> Result<Option<GenerationRecord>, DbError> {
        let row: Option<ManifestRow> = sqlx::query_as(&format!(
            "SELECT manifest FROM {} ORDER BY generation DESC LIMIT 1",
            self.tables.generations
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.manifest.0))
    }

    async fn upsert_performance(&self, records: &[PerformanceRecord]) -> Result<(), DbError> {
        let table = &self.tables.performance;
        let sql = format!(
            r#"
            INSERT INTO {table} (
                strategy_id, window_start, window_end, regime_label, trade_count,
                win_rate, profit_factor, max_drawdown_pct, sharpe_like_ratio,
                gross_profit, gross_loss, fitness_score
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (strategy_id, window_start) DO UPDATE SET
                window_end = EXCLUDED.window_end,
                regime_label = EXCLUDED.regime_label,
                trade_count = EXCLUDED.trade_count,
                win_rate = EXCLUDED.win_rate,
                profit_factor = EXCLUDED.profit_factor,
                max_drawdown_pct = EXCLUDED.max_drawdown_pct,
                sharpe_like_ratio = EXCLUDED.sharpe_like_ratio,
                gross_profit = EXCLUDED.gross_profit,
                gross_loss = EXCLUDED.gross_loss,
                fitness_score = COALESCE(EXCLUDED.fitness_score, {table}.fitness_score)
            "#
        );
        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(&sql)
                .bind(r.strategy_id)
                .bind(r.window_start)
                .bind(r.window_end)
                .bind(r.regime_label.as_str())
                .bind(i32::try_from(r.trade_count).unwrap_or(i32::MAX))
                .bind(r.win_rate)
                .bind(r.profit_factor)
                .bind(r.max_drawdown_pct)
                .bind(r.sharpe_like_ratio)
                .bind(r.gross_profit)
                .bind(r.gross_loss)
                .bind(r.fitness_score)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn performance_in_window(
        &self,
        window: EvaluationWindow,
    ) -> Result<Vec<PerformanceRecord>, DbError> {
        let rows: Vec<PerformanceRow> = sqlx::query_as(&format!(
            r#"
            SELECT strategy_id, window_start, window_end, regime_label, trade_count,
                   win_rate, profit_factor, max_drawdown_pct, sharpe_like_ratio,
                   gross_profit, gross_loss, fitness_score
            FROM {}
            WHERE window_start >= $1 AND window_end <= $2
            ORDER BY strategy_id, window_start
            "#,
            self.tables.performance
        ))
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PerformanceRecord::try_from).collect()
    }

    async fn save_regime_snapshot(&self, snapshot: &MarketRegimeSnapshot) -> Result<(), DbError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} ("timestamp", regime_label, volatility_index, trend_strength)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ("timestamp") DO NOTHING
            "#,
            self.tables.market_state
        ))
        .bind(snapshot.timestamp)
        .bind(snapshot.regime_label.as_str())
        .bind(snapshot.volatility_index)
        .bind(snapshot.trend_strength)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_regime_snapshot(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<MarketRegimeSnapshot>, DbError> {
        let row: Option<SnapshotRow> = sqlx::query_as(&format!(
            r#"
            SELECT "timestamp", regime_label, volatility_index, trend_strength
            FROM {}
            WHERE "timestamp" <= $1
            ORDER BY "timestamp" DESC
            LIMIT 1
            "#,
            self.tables.market_state
        ))
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MarketRegimeSnapshot::try_from).transpose()
    }

    async fn regime_snapshots(
        &self,
        window: EvaluationWindow,
    ) -> Result<Vec<MarketRegimeSnapshot>, DbError> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
            r#"
            SELECT "timestamp", regime_label, volatility_index, trend_strength
            FROM {}
            WHERE "timestamp" >= $1 AND "timestamp" < $2
            ORDER BY "timestamp"
            "#,
            self.tables.market_state
        ))
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MarketRegimeSnapshot::try_from).collect()
    }

    async fn save_trades(&self, trades: &[TradeOutcome]) -> Result<(), DbError> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                trade_id, strategy_id, symbol, side, entry_time, exit_time,
                realized_pnl, return_pct
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (trade_id) DO NOTHING
            "#,
            self.tables.trade_logs
        );
        let mut tx = self.pool.begin().await?;
        for t in trades {
            sqlx::query(&sql)
                .bind(t.trade_id)
                .bind(t.strategy_id)
                .bind(&t.symbol)
                .bind(side_str(t.side))
                .bind(t.entry_time)
                .bind(t.exit_time)
                .bind(t.realized_pnl)
                .bind(t.return_pct)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn trades_in_window(&self, window: EvaluationWindow) -> Result<Vec<TradeOutcome>, DbError> {
        let rows: Vec<TradeRow> = sqlx::query_as(&format!(
            r#"
            SELECT trade_id, strategy_id, symbol, side, entry_time, exit_time,
                   realized_pnl, return_pct
            FROM {}
            WHERE exit_time >= $1 AND exit_time < $2
            ORDER BY exit_time, trade_id
            "#,
            self.tables.trade_logs
        ))
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TradeOutcome::try_from).collect()
    }
}
