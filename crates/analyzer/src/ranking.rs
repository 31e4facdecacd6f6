use crate::fitness::{FitnessScore, GenomeFitness};
use core_types::RegimeLabel;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Which score a ranking compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "regime", rename_all = "snake_case")]
pub enum RankBasis {
    Regime(RegimeLabel),
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedGenome {
    pub strategy_id: Uuid,
    pub generation: u32,
    pub score: FitnessScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub basis: RankBasis,
    /// Best first.
    pub ranked: Vec<RankedGenome>,
}

impl Ranking {
    /// Number of ranked genomes whose score is backed by enough trades.
    pub fn sufficient_count(&self) -> usize {
        self.ranked.iter().filter(|r| !r.score.insufficient_data).count()
    }
}

/// Ranks the population by fitness, best first.
///
/// With a `regime`, genomes are compared on their score in that regime. When
/// fewer than `min_regime_population` genomes have sufficient data there, the
/// comparison falls back to the aggregate cross-regime score. Without a
/// regime the aggregate is used directly.
///
/// Ties break by lower max drawdown, then lower generation, then id, so the
/// order is total and deterministic.
pub fn rank_population(
    population: &[GenomeFitness],
    regime: Option<RegimeLabel>,
    min_regime_population: usize,
) -> Ranking {
    let basis = match regime {
        Some(label) => {
            let sufficient = population
                .iter()
                .filter(|f| !f.in_regime(label).insufficient_data)
                .count();
            if sufficient >= min_regime_population.max(1) {
                RankBasis::Regime(label)
            } else {
                tracing::info!(
                    regime = %label,
                    sufficient,
                    required = min_regime_population,
                    "Regime bucket too thin to rank, falling back to aggregate fitness"
                );
                RankBasis::Aggregate
            }
        }
        None => RankBasis::Aggregate,
    };

    let mut ranked: Vec<RankedGenome> = population
        .iter()
        .map(|f| RankedGenome {
            strategy_id: f.strategy_id,
            generation: f.generation,
            score: match basis {
                RankBasis::Regime(label) => f.in_regime(label),
                RankBasis::Aggregate => f.aggregate,
            },
        })
        .collect();
    ranked.sort_by(compare_ranked);

    Ranking { basis, ranked }
}

fn compare_ranked(a: &RankedGenome, b: &RankedGenome) -> Ordering {
    b.score
        .value
        .total_cmp(&a.score.value)
        .then_with(|| a.score.max_drawdown_pct.total_cmp(&b.score.max_drawdown_pct))
        .then_with(|| a.generation.cmp(&b.generation))
        .then_with(|| a.strategy_id.cmp(&b.strategy_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn score(value: f64, dd: f64) -> FitnessScore {
        FitnessScore {
            value,
            insufficient_data: false,
            trade_count: 10,
            max_drawdown_pct: dd,
        }
    }

    fn genome(id: u128, generation: u32, regime: Option<(RegimeLabel, f64)>, aggregate: f64) -> GenomeFitness {
        let mut per_regime = BTreeMap::new();
        if let Some((label, value)) = regime {
            per_regime.insert(label, score(value, 5.0));
        }
        GenomeFitness {
            strategy_id: Uuid::from_u128(id),
            generation,
            per_regime,
            aggregate: score(aggregate, 5.0),
        }
    }

    #[test]
    fn ranks_within_regime_when_bucket_is_populated() {
        let population = vec![
            genome(1, 0, Some((RegimeLabel::Trending, 0.3)), 0.9),
            genome(2, 0, Some((RegimeLabel::Trending, 0.8)), 0.1),
        ];
        let ranking = rank_population(&population, Some(RegimeLabel::Trending), 2);
        assert_eq!(ranking.basis, RankBasis::Regime(RegimeLabel::Trending));
        assert_eq!(ranking.ranked[0].strategy_id, Uuid::from_u128(2));
    }

    #[test]
    fn thin_regime_falls_back_to_aggregate() {
        let population = vec![
            genome(1, 0, Some((RegimeLabel::Volatile, 0.9)), 0.2),
            genome(2, 0, None, 0.7),
            genome(3, 0, None, 0.5),
        ];
        let ranking = rank_population(&population, Some(RegimeLabel::Volatile), 2);
        assert_eq!(ranking.basis, RankBasis::Aggregate);
        let order: Vec<u128> = ranking.ranked.iter().map(|r| r.strategy_id.as_u128()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn ties_break_on_drawdown_then_generation() {
        let mut low_dd = genome(1, 5, None, 0.5);
        low_dd.aggregate.max_drawdown_pct = 2.0;
        let older = genome(2, 1, None, 0.5);
        let newer = genome(3, 4, None, 0.5);
        let ranking = rank_population(&[newer, older, low_dd], None, 2);
        let order: Vec<u128> = ranking.ranked.iter().map(|r| r.strategy_id.as_u128()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
