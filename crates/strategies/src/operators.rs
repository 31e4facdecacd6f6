//! Genetic operators over strategy genomes.
//!
//! All randomness comes from the caller's RNG and every walk over genes is in
//! name order, so a seeded RNG reproduces the same children.

use crate::error::StrategyError;
use crate::genome::{Gene, GeneSpec, GeneValue, Lineage, Parameters, StrategyGenome};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashSet;
use uuid::Uuid;

/// Draws a genome id from the RNG instead of the OS so seeded runs agree.
pub fn next_id<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.r#gen()).into_uuid()
}

/// Samples a value uniformly from a gene's domain.
pub fn sample_gene<R: Rng + ?Sized>(spec: &GeneSpec, rng: &mut R) -> Gene {
    match spec {
        GeneSpec::Numeric { min, max, integer } => {
            let raw = if max > min { rng.gen_range(*min..=*max) } else { *min };
            Gene::numeric(spec.clone(), snap(raw, *min, *max, *integer))
        }
        GeneSpec::Categorical { choices } => {
            let value = if choices.is_empty() {
                String::new()
            } else {
                choices[rng.gen_range(0..choices.len())].clone()
            };
            Gene {
                spec: spec.clone(),
                value: GeneValue::Categorical(value),
            }
        }
    }
}

/// Clamps into range and rounds integer genes.
fn snap(value: f64, min: f64, max: f64, integer: bool) -> f64 {
    let value = if integer { value.round() } else { value };
    value.clamp(min, max)
}

/// Perturbs each gene independently with probability `rate`.
///
/// Numeric genes receive Gaussian jitter with standard deviation
/// `jitter * (max - min)`, clamped back into range. Categorical genes flip to a
/// different allowed choice.
pub fn mutate_genes<R: Rng + ?Sized>(
    params: &Parameters,
    rate: f64,
    jitter: f64,
    rng: &mut R,
) -> Result<Parameters, StrategyError> {
    let rate = rate.clamp(0.0, 1.0);
    let mut out = Parameters::new();
    for (name, gene) in params {
        let hit = rng.gen_bool(rate);
        let mutated = match (&gene.spec, &gene.value) {
            (GeneSpec::Numeric { min, max, integer }, GeneValue::Numeric(value))
                if hit && max > min =>
            {
                let normal = Normal::new(0.0, jitter * (max - min)).map_err(|e| {
                    StrategyError::InvalidParameters(format!("mutation jitter for '{name}': {e}"))
                })?;
                let mut next = snap(value + normal.sample(rng), *min, *max, *integer);
                // Integer genes with a tiny jitter would otherwise round back.
                if *integer && next == *value {
                    let step = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                    next = snap(value + step, *min, *max, true);
                }
                Gene::numeric(gene.spec.clone(), next)
            }
            (GeneSpec::Categorical { choices }, GeneValue::Categorical(value))
                if hit && choices.len() > 1 =>
            {
                let others: Vec<&String> = choices.iter().filter(|c| *c != value).collect();
                let pick = others[rng.gen_range(0..others.len())];
                Gene {
                    spec: gene.spec.clone(),
                    value: GeneValue::Categorical(pick.clone()),
                }
            }
            _ => gene.clone(),
        };
        out.insert(name.clone(), mutated);
    }
    Ok(out)
}

/// Combines two parents' genes.
///
/// With probability `rate` each gene is taken from either parent with equal
/// odds; otherwise the fitter parent's genes are copied. A gene is only taken
/// from `other` when both parents declare it with the same domain.
pub fn crossover_genes<R: Rng + ?Sized>(
    fitter: &StrategyGenome,
    other: &StrategyGenome,
    rate: f64,
    rng: &mut R,
) -> Parameters {
    if !rng.gen_bool(rate.clamp(0.0, 1.0)) {
        return fitter.parameters().clone();
    }
    fitter
        .parameters()
        .iter()
        .map(|(name, gene)| {
            let take_other = rng.gen_bool(0.5);
            let chosen = match other.parameters().get(name) {
                Some(candidate) if take_other && candidate.spec == gene.spec => candidate,
                _ => gene,
            };
            (name.clone(), chosen.clone())
        })
        .collect()
}

/// Returns a mutated child of `genome`, one generation later.
pub fn mutate<R: Rng + ?Sized>(
    genome: &StrategyGenome,
    rate: f64,
    jitter: f64,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<StrategyGenome, StrategyError> {
    let params = mutate_genes(genome.parameters(), rate, jitter, rng)?;
    StrategyGenome::create_with_id(
        next_id(rng),
        now,
        params,
        genome.rule_graph().clone(),
        Lineage::child_of(&[genome]),
    )
}

/// Returns the crossover child of two parents. The child inherits the rule
/// graph of `fitter`.
pub fn crossover<R: Rng + ?Sized>(
    fitter: &StrategyGenome,
    other: &StrategyGenome,
    rate: f64,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<StrategyGenome, StrategyError> {
    let params = crossover_genes(fitter, other, rate, rng);
    StrategyGenome::create_with_id(
        next_id(rng),
        now,
        params,
        fitter.rule_graph().clone(),
        Lineage::child_of(&[fitter, other]),
    )
}

/// Crossover followed by mutation, producing a single child whose lineage
/// records both parents.
pub fn breed<R: Rng + ?Sized>(
    fitter: &StrategyGenome,
    other: &StrategyGenome,
    settings: &BreedSettings,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<StrategyGenome, StrategyError> {
    let crossed = crossover_genes(fitter, other, settings.crossover_rate, rng);
    let params = mutate_genes(&crossed, settings.mutation_rate, settings.jitter, rng)?;
    let parents: Vec<&StrategyGenome> = if fitter.id() == other.id() {
        vec![fitter]
    } else {
        vec![fitter, other]
    };
    StrategyGenome::create_with_id(
        next_id(rng),
        now,
        params,
        fitter.rule_graph().clone(),
        Lineage::child_of(&parents),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreedSettings {
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub jitter: f64,
    pub max_resample_attempts: usize,
}

/// Calls `make` until it yields a genome whose fingerprint is not in `taken`.
///
/// After `max_attempts` collisions the last child is accepted anyway and the
/// duplicate is logged. The accepted fingerprint is added to `taken`.
pub fn resample_unique<F>(
    taken: &mut HashSet<String>,
    max_attempts: usize,
    mut make: F,
) -> Result<StrategyGenome, StrategyError>
where
    F: FnMut() -> Result<StrategyGenome, StrategyError>,
{
    let mut child = make()?;
    let mut attempts = 1;
    while taken.contains(&child.fingerprint()) && attempts < max_attempts.max(1) {
        child = make()?;
        attempts += 1;
    }
    let fingerprint = child.fingerprint();
    if taken.contains(&fingerprint) {
        tracing::warn!(
            strategy_id = %child.id(),
            attempts,
            "Accepting duplicate genome after exhausting resample attempts"
        );
    }
    taken.insert(fingerprint);
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn assert_in_range(genome: &StrategyGenome) {
        for (name, gene) in genome.parameters() {
            gene.validate(name).unwrap();
        }
    }

    #[test]
    fn genes_stay_in_range_under_repeated_operators() {
        let mut rng = StdRng::seed_from_u64(7);
        let settings = BreedSettings {
            crossover_rate: 0.9,
            mutation_rate: 1.0,
            jitter: 0.8,
            max_resample_attempts: 4,
        };
        let mut a = templates::trend_following().sample(&mut rng, now()).unwrap();
        let mut b = templates::trend_following().sample(&mut rng, now()).unwrap();
        for _ in 0..500 {
            let child = breed(&a, &b, &settings, &mut rng, now()).unwrap();
            assert_in_range(&child);
            b = a;
            a = mutate(&child, 1.0, 2.0, &mut rng, now()).unwrap();
            assert_in_range(&a);
        }
    }

    #[test]
    fn mutate_records_lineage() {
        let mut rng = StdRng::seed_from_u64(1);
        let parent = templates::mean_reversion().sample(&mut rng, now()).unwrap();
        let child = mutate(&parent, 0.5, 0.1, &mut rng, now()).unwrap();
        assert_eq!(child.lineage().parents, vec![parent.id()]);
        assert_eq!(child.generation(), parent.generation() + 1);
        assert_ne!(child.id(), parent.id());
    }

    #[test]
    fn crossover_without_recombination_copies_fitter_genes() {
        let mut rng = StdRng::seed_from_u64(3);
        let fitter = templates::trend_following().sample(&mut rng, now()).unwrap();
        let other = templates::trend_following().sample(&mut rng, now()).unwrap();
        let child = crossover(&fitter, &other, 0.0, &mut rng, now()).unwrap();
        assert_eq!(child.parameters(), fitter.parameters());
        assert_eq!(child.lineage().parents, vec![fitter.id(), other.id()]);
    }

    #[test]
    fn categorical_mutation_always_changes_value() {
        let mut rng = StdRng::seed_from_u64(11);
        let genome = templates::trend_following().sample(&mut rng, now()).unwrap();
        let before = genome.parameters()["ma_type"].as_category().unwrap().to_string();
        let mutated = mutate_genes(genome.parameters(), 1.0, 0.1, &mut rng).unwrap();
        assert_ne!(mutated["ma_type"].as_category().unwrap(), before);
    }

    #[test]
    fn same_seed_same_children() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(42);
            let parent = templates::volatility_breakout().sample(&mut rng, now()).unwrap();
            mutate(&parent, 0.5, 0.1, &mut rng, now()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn resample_gives_up_after_bounded_attempts() {
        let mut rng = StdRng::seed_from_u64(5);
        let genome = templates::trend_following().sample(&mut rng, now()).unwrap();
        let mut taken = HashSet::from([genome.fingerprint()]);
        let mut calls = 0;
        let child = resample_unique(&mut taken, 3, || {
            calls += 1;
            Ok(genome.clone())
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(child.fingerprint(), genome.fingerprint());
    }
}
