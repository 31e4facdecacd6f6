use crate::error::AnalyzerError;
use analytics::{PerformanceEngine, WindowMetrics};
use configuration::FitnessConfig;
use core_types::{PerformanceRecord, RegimeLabel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strategies::StrategyGenome;
use uuid::Uuid;

/// A scored set of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessScore {
    /// Weighted score, never negative.
    pub value: f64,
    /// Set when the genome traded less than the configured floor; `value` is then 0.
    pub insufficient_data: bool,
    pub trade_count: u32,
    pub max_drawdown_pct: f64,
}

impl FitnessScore {
    pub fn insufficient(trade_count: u32, max_drawdown_pct: f64) -> Self {
        Self {
            value: 0.0,
            insufficient_data: true,
            trade_count,
            max_drawdown_pct,
        }
    }
}

/// Fitness of one genome, per regime and across all regimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeFitness {
    pub strategy_id: Uuid,
    pub generation: u32,
    pub per_regime: BTreeMap<RegimeLabel, FitnessScore>,
    pub aggregate: FitnessScore,
}

impl GenomeFitness {
    /// The score in `regime`, or an empty insufficient score when the genome
    /// has no record there.
    pub fn in_regime(&self, regime: RegimeLabel) -> FitnessScore {
        self.per_regime
            .get(&regime)
            .copied()
            .unwrap_or_else(|| FitnessScore::insufficient(0, 0.0))
    }
}

pub struct FitnessEvaluator {
    config: FitnessConfig,
    performance: PerformanceEngine,
}

impl FitnessEvaluator {
    pub fn new(config: FitnessConfig) -> Result<Self, AnalyzerError> {
        let weights = [
            config.weight_profit_factor,
            config.weight_sharpe,
            config.weight_drawdown,
        ];
        if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(AnalyzerError::InvalidConfig(
                "weights must be non-negative and not all zero".to_string(),
            ));
        }
        if config.profit_factor_cap <= 0.0
            || config.sharpe_cap <= 0.0
            || config.drawdown_scale_pct <= 0.0
        {
            return Err(AnalyzerError::InvalidConfig(
                "normalisation caps must be positive".to_string(),
            ));
        }
        let performance = PerformanceEngine::new(config.profit_factor_cap);
        Ok(Self {
            config,
            performance,
        })
    }

    pub fn config(&self) -> &FitnessConfig {
        &self.config
    }

    /// Scores a set of metrics.
    ///
    /// Each metric is normalised into `[0, 1]`: profit factor against its cap,
    /// the Sharpe-like ratio from `[-cap, cap]`, and drawdown as
    /// `1 / (1 + dd / scale)`. The score is their weighted sum.
    ///
    /// No trades always scores exactly 0, whatever `min_trade_count` says.
    pub fn score(&self, metrics: &WindowMetrics) -> FitnessScore {
        if metrics.trade_count == 0 || metrics.trade_count < self.config.min_trade_count {
            return FitnessScore::insufficient(metrics.trade_count, metrics.max_drawdown_pct);
        }
        let c = &self.config;
        let pf_norm = metrics.profit_factor.clamp(0.0, c.profit_factor_cap) / c.profit_factor_cap;
        let sharpe_norm =
            (metrics.sharpe_like_ratio.clamp(-c.sharpe_cap, c.sharpe_cap) + c.sharpe_cap)
                / (2.0 * c.sharpe_cap);
        let dd_inverse = 1.0 / (1.0 + metrics.max_drawdown_pct.max(0.0) / c.drawdown_scale_pct);

        let value = c.weight_profit_factor * pf_norm
            + c.weight_sharpe * sharpe_norm
            + c.weight_drawdown * dd_inverse;
        FitnessScore {
            value: if value.is_finite() { value.max(0.0) } else { 0.0 },
            insufficient_data: false,
            trade_count: metrics.trade_count,
            max_drawdown_pct: metrics.max_drawdown_pct,
        }
    }

    /// Returns a copy of `record` with its own window's fitness filled in.
    pub fn annotate(&self, record: &PerformanceRecord) -> PerformanceRecord {
        let score = self.score(&self.performance.aggregate([record]));
        PerformanceRecord {
            fitness_score: Some(score.value),
            ..record.clone()
        }
    }

    /// Scores one genome from its records. Records of other strategies are ignored.
    pub fn evaluate(&self, genome: &StrategyGenome, records: &[PerformanceRecord]) -> GenomeFitness {
        let own: Vec<&PerformanceRecord> = records
            .iter()
            .filter(|r| r.strategy_id == genome.id())
            .collect();
        self.evaluate_records(genome, &own)
    }

    fn evaluate_records(&self, genome: &StrategyGenome, records: &[&PerformanceRecord]) -> GenomeFitness {
        let mut by_regime: BTreeMap<RegimeLabel, Vec<&PerformanceRecord>> = BTreeMap::new();
        for record in records {
            by_regime.entry(record.regime_label).or_default().push(record);
        }
        let per_regime = by_regime
            .into_iter()
            .map(|(label, recs)| (label, self.score(&self.performance.aggregate(recs))))
            .collect();
        let aggregate = self.score(&self.performance.aggregate(records.iter().copied()));

        GenomeFitness {
            strategy_id: genome.id(),
            generation: genome.generation(),
            per_regime,
            aggregate,
        }
    }

    /// Scores every genome. Genomes are independent, so this runs in parallel;
    /// the output keeps the order of `genomes`.
    pub fn evaluate_population(
        &self,
        genomes: &[StrategyGenome],
        records: &[PerformanceRecord],
    ) -> Vec<GenomeFitness> {
        let mut by_strategy: HashMap<Uuid, Vec<&PerformanceRecord>> = HashMap::new();
        for record in records {
            by_strategy.entry(record.strategy_id).or_default().push(record);
        }
        let results: Vec<GenomeFitness> = genomes
            .par_iter()
            .map(|genome| {
                let own = by_strategy.get(&genome.id()).map(Vec::as_slice).unwrap_or(&[]);
                self.evaluate_records(genome, own)
            })
            .collect();

        let insufficient = results.iter().filter(|f| f.aggregate.insufficient_data).count();
        tracing::debug!(
            genomes = results.len(),
            insufficient,
            "Evaluated population fitness"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use strategies::templates;

    fn evaluator() -> FitnessEvaluator {
        FitnessEvaluator::new(FitnessConfig::default()).unwrap()
    }

    fn metrics(trades: u32, pf: f64, sharpe: f64, dd: f64) -> WindowMetrics {
        WindowMetrics {
            trade_count: trades,
            win_rate: 0.5,
            profit_factor: pf,
            max_drawdown_pct: dd,
            sharpe_like_ratio: sharpe,
            gross_profit: 0.0,
            gross_loss: 0.0,
        }
    }

    pub(crate) fn record(
        strategy_id: Uuid,
        day: i64,
        regime: RegimeLabel,
        trades: u32,
        profit: f64,
        loss: f64,
    ) -> PerformanceRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
        PerformanceRecord {
            strategy_id,
            window_start: start,
            window_end: start + Duration::days(1),
            regime_label: regime,
            trade_count: trades,
            win_rate: 0.5,
            profit_factor: if loss > 0.0 { profit / loss } else { 5.0 },
            max_drawdown_pct: loss,
            sharpe_like_ratio: 0.5,
            gross_profit: profit,
            gross_loss: loss,
            fitness_score: None,
        }
    }

    #[test]
    fn zero_trades_score_exactly_zero() {
        let score = evaluator().score(&metrics(0, 0.0, -10.0, 80.0));
        assert_eq!(score.value, 0.0);
        assert!(score.insufficient_data);
    }

    #[test]
    fn zero_trades_score_zero_even_without_a_floor() {
        let no_floor = FitnessEvaluator::new(FitnessConfig {
            min_trade_count: 0,
            ..FitnessConfig::default()
        })
        .unwrap();
        let score = no_floor.score(&WindowMetrics::default());
        assert_eq!(score.value, 0.0);
        assert!(score.insufficient_data);
        assert!(no_floor.score(&metrics(1, 2.0, 0.5, 1.0)).value > 0.0);
    }

    #[test]
    fn below_floor_is_flagged_not_negative() {
        let score = evaluator().score(&metrics(4, 3.0, 2.0, 1.0));
        assert_eq!(score.value, 0.0);
        assert!(score.insufficient_data);
    }

    #[test]
    fn perfect_metrics_reach_the_weight_sum() {
        let score = evaluator().score(&metrics(10, 100.0, 100.0, 0.0));
        assert!((score.value - 1.0).abs() < 1e-12);
        assert!(!score.insufficient_data);
    }

    #[test]
    fn worst_metrics_stay_non_negative() {
        let score = evaluator().score(&metrics(10, 0.0, -100.0, 1000.0));
        assert!(score.value >= 0.0);
        assert!(score.value < 0.05);
    }

    #[test]
    fn better_profit_factor_scores_higher() {
        let e = evaluator();
        assert!(e.score(&metrics(10, 2.0, 0.5, 5.0)).value > e.score(&metrics(10, 1.0, 0.5, 5.0)).value);
    }

    #[test]
    fn rejects_all_zero_weights() {
        let config = FitnessConfig {
            weight_profit_factor: 0.0,
            weight_sharpe: 0.0,
            weight_drawdown: 0.0,
            ..FitnessConfig::default()
        };
        assert!(FitnessEvaluator::new(config).is_err());
    }

    #[test]
    fn fitness_is_bucketed_by_regime() {
        let mut rng = StdRng::seed_from_u64(1);
        let genome = templates::trend_following().sample(&mut rng, Utc::now()).unwrap();
        let id = genome.id();
        let records = vec![
            record(id, 0, RegimeLabel::Trending, 6, 12.0, 2.0),
            record(id, 1, RegimeLabel::Ranging, 2, 1.0, 3.0),
            record(Uuid::new_v4(), 1, RegimeLabel::Ranging, 9, 1.0, 3.0),
        ];
        let fitness = evaluator().evaluate(&genome, &records);

        assert!(!fitness.in_regime(RegimeLabel::Trending).insufficient_data);
        assert!(fitness.in_regime(RegimeLabel::Ranging).insufficient_data);
        assert!(fitness.in_regime(RegimeLabel::Volatile).insufficient_data);
        assert_eq!(fitness.aggregate.trade_count, 8);
        assert!(!fitness.aggregate.insufficient_data);
    }

    #[test]
    fn annotate_fills_fitness() {
        let annotated = evaluator().annotate(&record(Uuid::new_v4(), 0, RegimeLabel::Trending, 6, 6.0, 2.0));
        assert!(annotated.fitness_score.is_some_and(|f| f > 0.0));
    }
}
