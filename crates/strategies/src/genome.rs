use crate::error::StrategyError;
use crate::rule_graph::RuleGraph;
use chrono::{DateTime, Utc};
use core_types::GenomeStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The declared domain of a gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneSpec {
    Numeric { min: f64, max: f64, integer: bool },
    Categorical { choices: Vec<String> },
}

impl GeneSpec {
    pub fn real(min: f64, max: f64) -> Self {
        GeneSpec::Numeric {
            min,
            max,
            integer: false,
        }
    }

    pub fn integer(min: f64, max: f64) -> Self {
        GeneSpec::Numeric {
            min,
            max,
            integer: true,
        }
    }

    pub fn categorical(choices: &[&str]) -> Self {
        GeneSpec::Categorical {
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneValue {
    Numeric(f64),
    Categorical(String),
}

/// One named parameter of a strategy: its value and the range it must stay in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub spec: GeneSpec,
    pub value: GeneValue,
}

impl Gene {
    pub fn numeric(spec: GeneSpec, value: f64) -> Self {
        Self {
            spec,
            value: GeneValue::Numeric(value),
        }
    }

    pub fn categorical(spec: GeneSpec, value: &str) -> Self {
        Self {
            spec,
            value: GeneValue::Categorical(value.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            GeneValue::Numeric(v) => Some(v),
            GeneValue::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match &self.value {
            GeneValue::Categorical(v) => Some(v.as_str()),
            GeneValue::Numeric(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.spec, GeneSpec::Numeric { .. })
    }

    /// Checks the value against the declared range or choice set.
    pub fn validate(&self, name: &str) -> Result<(), StrategyError> {
        match (&self.spec, &self.value) {
            (GeneSpec::Numeric { min, max, integer }, GeneValue::Numeric(value)) => {
                let out_of_range = !value.is_finite() || value < min || value > max;
                let not_integral = *integer && value.fract() != 0.0;
                if min > max || out_of_range || not_integral {
                    return Err(StrategyError::InvalidGeneRange {
                        gene: name.to_string(),
                        value: *value,
                        min: *min,
                        max: *max,
                    });
                }
                Ok(())
            }
            (GeneSpec::Categorical { choices }, GeneValue::Categorical(value)) => {
                if !choices.contains(value) {
                    return Err(StrategyError::InvalidCategory {
                        gene: name.to_string(),
                        value: value.clone(),
                    });
                }
                Ok(())
            }
            (GeneSpec::Numeric { .. }, GeneValue::Categorical(_)) => {
                Err(StrategyError::GeneKindMismatch {
                    gene: name.to_string(),
                    expected: "numeric",
                })
            }
            (GeneSpec::Categorical { .. }, GeneValue::Numeric(_)) => {
                Err(StrategyError::GeneKindMismatch {
                    gene: name.to_string(),
                    expected: "categorical",
                })
            }
        }
    }
}

/// Genes keyed by name. Ordered so that every walk over a genome is deterministic.
pub type Parameters = BTreeMap<String, Gene>;

/// Where a genome came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub parents: Vec<Uuid>,
    pub generation: u32,
}

impl Lineage {
    /// Lineage of a genome sampled from a template.
    pub fn seed() -> Self {
        Self {
            parents: Vec::new(),
            generation: 0,
        }
    }

    /// Lineage of a child of `parents`, one generation after the youngest of them.
    pub fn child_of(parents: &[&StrategyGenome]) -> Self {
        Self {
            parents: parents.iter().map(|p| p.id()).collect(),
            generation: parents
                .iter()
                .map(|p| p.generation())
                .max()
                .unwrap_or(0)
                + 1,
        }
    }
}

/// An immutable, versioned description of one trading strategy.
///
/// Evolution never edits a genome: operators always return a new one with a
/// fresh id. The only derived copy is [`StrategyGenome::with_status`], used
/// when the same genome moves between lifecycle states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyGenome {
    id: Uuid,
    lineage: Lineage,
    parameters: Parameters,
    rule_graph: RuleGraph,
    created_at: DateTime<Utc>,
    status: GenomeStatus,
}

impl StrategyGenome {
    /// Creates a new candidate genome with a random id.
    ///
    /// Fails with `InvalidGeneRange`/`InvalidCategory` when any gene lies
    /// outside its declared domain, and when the rule graph references a gene
    /// that does not exist or has the wrong kind.
    pub fn create(
        parameters: Parameters,
        rule_graph: RuleGraph,
        lineage: Lineage,
    ) -> Result<Self, StrategyError> {
        Self::create_with_id(Uuid::new_v4(), Utc::now(), parameters, rule_graph, lineage)
    }

    /// Like [`StrategyGenome::create`], with the id and timestamp supplied by
    /// the caller so that seeded runs are reproducible.
    pub fn create_with_id(
        id: Uuid,
        created_at: DateTime<Utc>,
        parameters: Parameters,
        rule_graph: RuleGraph,
        lineage: Lineage,
    ) -> Result<Self, StrategyError> {
        let genome = Self {
            id,
            lineage,
            parameters,
            rule_graph,
            created_at,
            status: GenomeStatus::Candidate,
        };
        genome.validate(None)?;
        Ok(genome)
    }

    /// Checks every gene and every gene reference in the rule graph, and
    /// optionally the rule graph's size.
    pub fn validate(&self, max_nodes: Option<usize>) -> Result<(), StrategyError> {
        for (name, gene) in &self.parameters {
            gene.validate(name)?;
        }
        self.rule_graph.check_references(&self.parameters)?;
        if let Some(max) = max_nodes {
            let nodes = self.rule_graph.node_count();
            if nodes > max {
                return Err(StrategyError::ComplexityExceeded { nodes, max });
            }
        }
        Ok(())
    }

    /// Returns a copy of this genome in a different lifecycle state.
    pub fn with_status(&self, status: GenomeStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn generation(&self) -> u32 {
        self.lineage.generation
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn rule_graph(&self) -> &RuleGraph {
        &self.rule_graph
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> GenomeStatus {
        self.status
    }

    /// The value of a numeric gene, if the genome has one by that name.
    pub fn numeric_gene(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(Gene::as_f64)
    }

    /// A key that is equal for two genomes exactly when they would trade the
    /// same way: same rule graph and same gene values. Ids and lineage are ignored.
    pub fn fingerprint(&self) -> String {
        let values: BTreeMap<&str, &GeneValue> = self
            .parameters
            .iter()
            .map(|(name, gene)| (name.as_str(), &gene.value))
            .collect();
        serde_json::to_string(&(&self.rule_graph, values)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_graph::{Condition, Expr, IndicatorKind, Period};

    fn graph() -> RuleGraph {
        RuleGraph {
            name: "test".to_string(),
            entry: Condition::Gt(
                Expr::indicator(IndicatorKind::Close),
                Expr::Indicator(IndicatorKind::Sma, Period::Gene("period".to_string())),
            ),
            exit: Condition::Never,
            sizing: Expr::Const(1.0),
        }
    }

    fn params(period: f64) -> Parameters {
        let mut params = Parameters::new();
        params.insert(
            "period".to_string(),
            Gene::numeric(GeneSpec::integer(5.0, 50.0), period),
        );
        params
    }

    #[test]
    fn create_accepts_in_range_genes() {
        let genome = StrategyGenome::create(params(20.0), graph(), Lineage::seed()).unwrap();
        assert_eq!(genome.status(), GenomeStatus::Candidate);
        assert_eq!(genome.numeric_gene("period"), Some(20.0));
    }

    #[test]
    fn create_rejects_out_of_range_genes() {
        let err = StrategyGenome::create(params(60.0), graph(), Lineage::seed()).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidGeneRange { value, .. } if value == 60.0));
    }

    #[test]
    fn create_rejects_fractional_integer_genes() {
        assert!(StrategyGenome::create(params(12.5), graph(), Lineage::seed()).is_err());
    }

    #[test]
    fn create_rejects_unknown_categories() {
        let mut params = params(20.0);
        params.insert(
            "ma_type".to_string(),
            Gene::categorical(GeneSpec::categorical(&["sma", "ema"]), "wma"),
        );
        let err = StrategyGenome::create(params, graph(), Lineage::seed()).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidCategory { .. }));
    }

    #[test]
    fn create_rejects_dangling_gene_references() {
        let err = StrategyGenome::create(Parameters::new(), graph(), Lineage::seed()).unwrap_err();
        assert_eq!(err, StrategyError::UnknownGene("period".to_string()));
    }

    #[test]
    fn fingerprint_ignores_identity() {
        let a = StrategyGenome::create(params(20.0), graph(), Lineage::seed()).unwrap();
        let b = StrategyGenome::create(params(20.0), graph(), Lineage::seed()).unwrap();
        let c = StrategyGenome::create(params(21.0), graph(), Lineage::seed()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn complexity_limit_is_enforced_on_validate() {
        let genome = StrategyGenome::create(params(20.0), graph(), Lineage::seed()).unwrap();
        assert!(genome.validate(Some(50)).is_ok());
        assert!(matches!(
            genome.validate(Some(2)),
            Err(StrategyError::ComplexityExceeded { .. })
        ));
    }
}
