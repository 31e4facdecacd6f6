use analyzer::Ranking;
use chrono::{DateTime, Utc};
use configuration::EvolutionConfig;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use std::collections::{HashMap, HashSet};
use strategies::{BreedSettings, StrategyError, StrategyGenome, breed, mutate, resample_unique};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionSettings {
    pub population_size: usize,
    pub elitism_count: usize,
    /// Floor on fitness when turning it into a selection weight.
    pub epsilon: f64,
    pub breed: BreedSettings,
}

impl SelectionSettings {
    pub fn from_config(config: &EvolutionConfig) -> Self {
        Self {
            population_size: config.population_size,
            elitism_count: config.elitism_count,
            epsilon: config.selection_epsilon,
            breed: BreedSettings {
                crossover_rate: config.crossover_rate,
                mutation_rate: config.mutation_rate,
                jitter: config.mutation_jitter,
                max_resample_attempts: config.max_resample_attempts,
            },
        }
    }
}

/// The members of the next generation, before the risk governor has seen them.
#[derive(Debug, Clone, Default)]
pub struct Offspring {
    /// Carried over unchanged, best first.
    pub elites: Vec<StrategyGenome>,
    /// New genomes, in the order they were bred.
    pub children: Vec<StrategyGenome>,
    /// No genome had enough data to rank, so only mutation was used.
    pub degraded: bool,
}

impl Offspring {
    pub fn len(&self) -> usize {
        self.elites.len() + self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elites first, then children.
    pub fn into_members(self) -> Vec<StrategyGenome> {
        let mut members = self.elites;
        members.extend(self.children);
        members
    }
}

/// Ids of the genomes carried over unchanged: the best `elitism_count`
/// genomes whose score is backed by enough trades.
pub fn select_elites(ranking: &Ranking, elitism_count: usize) -> Vec<Uuid> {
    ranking
        .ranked
        .iter()
        .filter(|r| !r.score.insufficient_data)
        .take(elitism_count)
        .map(|r| r.strategy_id)
        .collect()
}

/// Fitness-proportional parent selection with weights `max(fitness, epsilon)`.
pub fn selection_weights(ranking: &Ranking, epsilon: f64) -> Vec<f64> {
    ranking
        .ranked
        .iter()
        .map(|r| r.score.value.max(epsilon))
        .collect()
}

/// Builds the next generation from the ranked current one.
///
/// With at least one genome backed by enough data, the elites are carried
/// over and the remaining slots are bred: two parents are drawn by roulette,
/// the higher-ranked one counts as the fitter, and their child goes through
/// crossover then mutation. Otherwise the cycle degrades to mutating the best
/// available genome, which is itself carried over.
///
/// Children never duplicate a current member, an elite or an earlier child,
/// within `max_resample_attempts`. For a fixed ranking and RNG state the
/// result is deterministic.
pub fn next_population<R: Rng + ?Sized>(
    ranking: &Ranking,
    members: &[StrategyGenome],
    settings: &SelectionSettings,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<Offspring, StrategyError> {
    let by_id: HashMap<Uuid, &StrategyGenome> = members.iter().map(|g| (g.id(), g)).collect();
    let ranked: Vec<&StrategyGenome> = ranking
        .ranked
        .iter()
        .filter_map(|r| by_id.get(&r.strategy_id).copied())
        .collect();
    let Some(best) = ranked.first().copied() else {
        return Ok(Offspring::default());
    };
    let mut taken: HashSet<String> = members.iter().map(StrategyGenome::fingerprint).collect();

    if ranking.sufficient_count() == 0 {
        tracing::warn!(
            best = %best.id(),
            "No genome has sufficient data; breeding by mutation of the best available genome"
        );
        let slots = settings.population_size.saturating_sub(1);
        let mut children = Vec::with_capacity(slots);
        for _ in 0..slots {
            children.push(resample_unique(
                &mut taken,
                settings.breed.max_resample_attempts,
                || mutate(best, settings.breed.mutation_rate, settings.breed.jitter, rng, now),
            )?);
        }
        return Ok(Offspring {
            elites: vec![best.clone()],
            children,
            degraded: true,
        });
    }

    let elites: Vec<StrategyGenome> = select_elites(ranking, settings.elitism_count)
        .into_iter()
        .filter_map(|id| by_id.get(&id).map(|g| (*g).clone()))
        .collect();

    let weights = selection_weights(ranking, settings.epsilon);
    let roulette = WeightedIndex::new(&weights)
        .map_err(|e| StrategyError::InvalidParameters(format!("selection weights: {e}")))?;

    let slots = settings.population_size.saturating_sub(elites.len());
    let mut children = Vec::with_capacity(slots);
    for _ in 0..slots {
        let child = resample_unique(&mut taken, settings.breed.max_resample_attempts, || {
            let a = roulette.sample(rng);
            let b = roulette.sample(rng);
            let (fitter, other) = if a <= b { (a, b) } else { (b, a) };
            breed(ranked[fitter], ranked[other], &settings.breed, rng, now)
        })?;
        children.push(child);
    }

    tracing::debug!(
        elites = elites.len(),
        children = children.len(),
        "Bred next generation"
    );
    Ok(Offspring {
        elites,
        children,
        degraded: false,
    })
}
