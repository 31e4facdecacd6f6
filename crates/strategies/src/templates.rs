//! Seed templates for the initial population.
//!
//! Each template fixes a rule graph and declares the genes it reads. Initial
//! genomes sample every gene uniformly within its range.

use crate::error::StrategyError;
use crate::genome::{GeneSpec, Lineage, Parameters, StrategyGenome};
use crate::operators::{next_id, sample_gene};
use crate::rule_graph::{Condition, Expr, IndicatorKind, Period, RuleGraph};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::BTreeMap;

/// Gene names every template carries. The simulator and the risk governor read them.
pub const STOP_LOSS_GENE: &str = "stop_loss_pct";
pub const TAKE_PROFIT_GENE: &str = "take_profit_pct";
pub const POSITION_SIZE_GENE: &str = "position_size";

#[derive(Debug, Clone)]
pub struct Template {
    pub name: &'static str,
    pub genes: BTreeMap<String, GeneSpec>,
    pub rule_graph: RuleGraph,
}

impl Template {
    /// Draws a generation-zero genome from this template.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<StrategyGenome, StrategyError> {
        let params: Parameters = self
            .genes
            .iter()
            .map(|(name, spec)| (name.clone(), sample_gene(spec, rng)))
            .collect();
        StrategyGenome::create_with_id(
            next_id(rng),
            now,
            params,
            self.rule_graph.clone(),
            Lineage::seed(),
        )
    }
}

fn with_risk_genes(mut genes: BTreeMap<String, GeneSpec>) -> BTreeMap<String, GeneSpec> {
    genes.insert(STOP_LOSS_GENE.to_string(), GeneSpec::real(0.5, 5.0));
    genes.insert(TAKE_PROFIT_GENE.to_string(), GeneSpec::real(1.0, 10.0));
    genes.insert(POSITION_SIZE_GENE.to_string(), GeneSpec::real(0.1, 1.0));
    genes
}

fn gene_period(kind: IndicatorKind, gene: &str) -> Expr {
    Expr::Indicator(kind, Period::Gene(gene.to_string()))
}

fn close() -> Expr {
    Expr::indicator(IndicatorKind::Close)
}

/// Moving-average crossover with a long-term trend filter. The `ma_type` gene
/// selects simple or exponential averages.
pub fn trend_following() -> Template {
    let genes = with_risk_genes(BTreeMap::from([
        ("fast_period".to_string(), GeneSpec::integer(5.0, 30.0)),
        ("slow_period".to_string(), GeneSpec::integer(31.0, 120.0)),
        ("trend_period".to_string(), GeneSpec::integer(100.0, 200.0)),
        ("ma_type".to_string(), GeneSpec::categorical(&["sma", "ema"])),
    ]));

    let cross_up = |kind| {
        Condition::Gt(gene_period(kind, "fast_period"), gene_period(kind, "slow_period"))
    };
    let cross_down = |kind| {
        Condition::Lt(gene_period(kind, "fast_period"), gene_period(kind, "slow_period"))
    };
    let is_sma = || Condition::GeneIs("ma_type".to_string(), "sma".to_string());
    let is_ema = || Condition::GeneIs("ma_type".to_string(), "ema".to_string());

    let entry = is_sma()
        .and(cross_up(IndicatorKind::Sma))
        .or(is_ema().and(cross_up(IndicatorKind::Ema)))
        .and(Condition::Gt(close(), gene_period(IndicatorKind::Sma, "trend_period")));
    let exit = is_sma()
        .and(cross_down(IndicatorKind::Sma))
        .or(is_ema().and(cross_down(IndicatorKind::Ema)));

    Template {
        name: "trend_following",
        genes,
        rule_graph: RuleGraph {
            name: "trend_following".to_string(),
            entry,
            exit,
            sizing: Expr::gene(POSITION_SIZE_GENE),
        },
    }
}

/// Buys oversold dips and sells into overbought strength, measured by RSI.
pub fn mean_reversion() -> Template {
    let genes = with_risk_genes(BTreeMap::from([
        ("rsi_period".to_string(), GeneSpec::integer(7.0, 28.0)),
        ("oversold".to_string(), GeneSpec::real(15.0, 40.0)),
        ("overbought".to_string(), GeneSpec::real(60.0, 85.0)),
    ]));
    let rsi = || gene_period(IndicatorKind::Rsi, "rsi_period");

    Template {
        name: "mean_reversion",
        genes,
        rule_graph: RuleGraph {
            name: "mean_reversion".to_string(),
            entry: Condition::Lt(rsi(), Expr::gene("oversold")),
            exit: Condition::Gt(rsi(), Expr::gene("overbought")),
            // Deeper dips size up, capped by the position gene.
            sizing: Expr::gene(POSITION_SIZE_GENE).min(
                Expr::gene("oversold")
                    .div(rsi().add(Expr::Const(1.0)))
                    .mul(Expr::gene(POSITION_SIZE_GENE)),
            ),
        },
    }
}

/// Enters when price breaks above a standard-deviation band and exits on a
/// return to the mean. Sizing is inverse to ATR volatility.
pub fn volatility_breakout() -> Template {
    let genes = with_risk_genes(BTreeMap::from([
        ("lookback".to_string(), GeneSpec::integer(10.0, 50.0)),
        ("band_width".to_string(), GeneSpec::real(1.0, 3.5)),
        ("atr_period".to_string(), GeneSpec::integer(7.0, 28.0)),
        ("momentum_period".to_string(), GeneSpec::integer(3.0, 20.0)),
    ]));
    let mean = || gene_period(IndicatorKind::Sma, "lookback");
    let band = mean().add(
        gene_period(IndicatorKind::StdDev, "lookback").mul(Expr::gene("band_width")),
    );
    let atr_pct = gene_period(IndicatorKind::Atr, "atr_period")
        .mul(Expr::Const(100.0))
        .div(close());

    Template {
        name: "volatility_breakout",
        genes,
        rule_graph: RuleGraph {
            name: "volatility_breakout".to_string(),
            entry: Condition::Gt(close(), band).and(Condition::Gt(
                gene_period(IndicatorKind::Roc, "momentum_period"),
                Expr::Const(0.0),
            )),
            exit: Condition::Lt(close(), mean()),
            sizing: Expr::gene(POSITION_SIZE_GENE).min(Expr::Const(1.0).div(atr_pct)),
        },
    }
}

pub fn all() -> Vec<Template> {
    vec![trend_following(), mean_reversion(), volatility_breakout()]
}

pub fn by_name(name: &str) -> Result<Template, StrategyError> {
    all()
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| StrategyError::TemplateNotFound(name.to_string()))
}

/// Builds an initial population of `size` genomes, cycling through the templates.
pub fn seed_population<R: Rng + ?Sized>(
    size: usize,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<Vec<StrategyGenome>, StrategyError> {
    let templates = all();
    (0..size)
        .map(|i| templates[i % templates.len()].sample(rng, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn every_template_produces_valid_genomes() {
        let mut rng = StdRng::seed_from_u64(9);
        let now = Utc::now();
        for template in all() {
            for _ in 0..20 {
                let genome = template.sample(&mut rng, now).unwrap();
                genome.validate(Some(50)).unwrap();
                assert!(genome.numeric_gene(STOP_LOSS_GENE).is_some());
            }
        }
    }

    #[test]
    fn seed_population_cycles_templates() {
        let mut rng = StdRng::seed_from_u64(9);
        let population = seed_population(5, &mut rng, Utc::now()).unwrap();
        let names: Vec<&str> = population.iter().map(|g| g.rule_graph().name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "trend_following",
                "mean_reversion",
                "volatility_breakout",
                "trend_following",
                "mean_reversion"
            ]
        );
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(matches!(by_name("martingale"), Err(StrategyError::TemplateNotFound(_))));
    }
}
