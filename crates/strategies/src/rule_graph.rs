//! The rule graph: a small expression tree over indicator values and genes.
//!
//! Evaluation is pure. Given the latest [`FeatureVector`] and a genome's
//! parameters, [`RuleGraph::decide`] says whether to enter, whether to exit and
//! how much of the allowed position to use.

use crate::error::StrategyError;
use crate::genome::Parameters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Close,
    Sma,
    Ema,
    Rsi,
    Atr,
    StdDev,
    Roc,
}

/// The lookback of an indicator: fixed, or taken from a numeric gene so that
/// evolution can tune it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Fixed(usize),
    Gene(String),
}

impl Period {
    fn resolve(&self, params: &Parameters) -> Option<usize> {
        match self {
            Period::Fixed(p) => Some(*p),
            Period::Gene(name) => params
                .get(name)
                .and_then(|g| g.as_f64())
                .map(|v| v.round().max(1.0) as usize),
        }
    }
}

/// A concrete indicator instance once gene-valued periods are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndicatorKey {
    pub kind: IndicatorKind,
    pub period: usize,
}

impl IndicatorKey {
    pub fn close() -> Self {
        Self {
            kind: IndicatorKind::Close,
            period: 0,
        }
    }
}

/// Latest value of every indicator a rule graph needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    values: BTreeMap<IndicatorKey, f64>,
}

impl FeatureVector {
    pub fn insert(&mut self, key: IndicatorKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &IndicatorKey) -> Option<f64> {
        self.values.get(key).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Const(f64),
    Gene(String),
    Indicator(IndicatorKind, Period),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// An indicator that takes no lookback, or a fixed lookback of one bar.
    pub fn indicator(kind: IndicatorKind) -> Self {
        Expr::Indicator(kind, Period::Fixed(1))
    }

    pub fn gene(name: &str) -> Self {
        Expr::Gene(name.to_string())
    }

    pub fn add(self, rhs: Expr) -> Self {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn div(self, rhs: Expr) -> Self {
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    pub fn min(self, rhs: Expr) -> Self {
        Expr::Min(Box::new(self), Box::new(rhs))
    }

    /// Evaluates the expression. `None` when an input is missing or the result
    /// is not a finite number.
    pub fn eval(&self, features: &FeatureVector, params: &Parameters) -> Option<f64> {
        let value = match self {
            Expr::Const(v) => *v,
            Expr::Gene(name) => params.get(name)?.as_f64()?,
            Expr::Indicator(kind, period) => {
                features.get(&resolve_key(*kind, period, params)?)?
            }
            Expr::Add(a, b) => a.eval(features, params)? + b.eval(features, params)?,
            Expr::Sub(a, b) => a.eval(features, params)? - b.eval(features, params)?,
            Expr::Mul(a, b) => a.eval(features, params)? * b.eval(features, params)?,
            Expr::Div(a, b) => {
                let divisor = b.eval(features, params)?;
                if divisor == 0.0 {
                    return None;
                }
                a.eval(features, params)? / divisor
            }
            Expr::Min(a, b) => a.eval(features, params)?.min(b.eval(features, params)?),
            Expr::Max(a, b) => a.eval(features, params)?.max(b.eval(features, params)?),
        };
        value.is_finite().then_some(value)
    }

    fn node_count(&self) -> usize {
        match self {
            Expr::Const(_) | Expr::Gene(_) | Expr::Indicator(..) => 1,
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Min(a, b)
            | Expr::Max(a, b) => 1 + a.node_count() + b.node_count(),
        }
    }

    fn visit<'a>(&'a self, visitor: &mut impl FnMut(Node<'a>)) {
        match self {
            Expr::Const(_) => {}
            Expr::Gene(name) => visitor(Node::NumericGene(name)),
            Expr::Indicator(kind, period) => visitor(Node::Indicator(*kind, period)),
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Min(a, b)
            | Expr::Max(a, b) => {
                a.visit(visitor);
                b.visit(visitor);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    Never,
    Gt(Expr, Expr),
    Lt(Expr, Expr),
    /// True when a categorical gene holds the given choice.
    GeneIs(String, String),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn and(self, rhs: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(rhs))
    }

    /// Comparisons over missing inputs are false.
    pub fn eval(&self, features: &FeatureVector, params: &Parameters) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Gt(a, b) => match (a.eval(features, params), b.eval(features, params)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            Condition::Lt(a, b) => match (a.eval(features, params), b.eval(features, params)) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            Condition::GeneIs(name, choice) => params
                .get(name)
                .and_then(|g| g.as_category())
                .is_some_and(|v| v == choice),
            Condition::And(a, b) => a.eval(features, params) && b.eval(features, params),
            Condition::Or(a, b) => a.eval(features, params) || b.eval(features, params),
            Condition::Not(c) => !c.eval(features, params),
        }
    }

    fn node_count(&self) -> usize {
        match self {
            Condition::Always | Condition::Never | Condition::GeneIs(..) => 1,
            Condition::Gt(a, b) | Condition::Lt(a, b) => 1 + a.node_count() + b.node_count(),
            Condition::And(a, b) | Condition::Or(a, b) => 1 + a.node_count() + b.node_count(),
            Condition::Not(c) => 1 + c.node_count(),
        }
    }

    fn visit<'a>(&'a self, visitor: &mut impl FnMut(Node<'a>)) {
        match self {
            Condition::Always | Condition::Never => {}
            Condition::Gt(a, b) | Condition::Lt(a, b) => {
                a.visit(visitor);
                b.visit(visitor);
            }
            Condition::GeneIs(name, _) => visitor(Node::CategoricalGene(name)),
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.visit(visitor);
                b.visit(visitor);
            }
            Condition::Not(c) => c.visit(visitor),
        }
    }
}

/// Leaves of a rule graph that depend on the genome.
enum Node<'a> {
    NumericGene(&'a str),
    CategoricalGene(&'a str),
    Indicator(IndicatorKind, &'a Period),
}

/// The outcome of evaluating a rule graph on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub enter: bool,
    pub exit: bool,
    /// Fraction of the allowed position to commit, in `[0, 1]`.
    pub size_fraction: f64,
}

/// Entry, exit and position-sizing rules of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGraph {
    /// Name of the template the graph descends from.
    pub name: String,
    pub entry: Condition,
    pub exit: Condition,
    pub sizing: Expr,
}

impl RuleGraph {
    pub fn decide(&self, features: &FeatureVector, params: &Parameters) -> Decision {
        let size_fraction = self
            .sizing
            .eval(features, params)
            .map(|s| s.clamp(0.0, 1.0))
            .unwrap_or(0.0);
        Decision {
            enter: self.entry.eval(features, params),
            exit: self.exit.eval(features, params),
            size_fraction,
        }
    }

    pub fn node_count(&self) -> usize {
        self.entry.node_count() + self.exit.node_count() + self.sizing.node_count()
    }

    /// The concrete indicators that must be computed to evaluate this graph.
    /// Always includes the close price.
    pub fn required_indicators(&self, params: &Parameters) -> BTreeSet<IndicatorKey> {
        let mut keys = BTreeSet::from([IndicatorKey::close()]);
        self.visit(&mut |node| {
            if let Node::Indicator(kind, period) = node {
                if let Some(key) = resolve_key(kind, period, params) {
                    keys.insert(key);
                }
            }
        });
        keys
    }

    /// Every gene the graph reads must exist and have the kind it is used as.
    pub(crate) fn check_references(&self, params: &Parameters) -> Result<(), StrategyError> {
        let mut result = Ok(());
        self.visit(&mut |node| {
            if result.is_err() {
                return;
            }
            let (name, numeric) = match node {
                Node::NumericGene(name) => (name, true),
                Node::CategoricalGene(name) => (name, false),
                Node::Indicator(_, Period::Gene(name)) => (name.as_str(), true),
                Node::Indicator(_, Period::Fixed(_)) => return,
            };
            result = match params.get(name) {
                None => Err(StrategyError::UnknownGene(name.to_string())),
                Some(gene) if gene.is_numeric() != numeric => {
                    Err(StrategyError::GeneKindMismatch {
                        gene: name.to_string(),
                        expected: if numeric { "numeric" } else { "categorical" },
                    })
                }
                Some(_) => Ok(()),
            };
        });
        result
    }

    fn visit<'a>(&'a self, visitor: &mut impl FnMut(Node<'a>)) {
        self.entry.visit(visitor);
        self.exit.visit(visitor);
        self.sizing.visit(visitor);
    }
}

fn resolve_key(kind: IndicatorKind, period: &Period, params: &Parameters) -> Option<IndicatorKey> {
    if kind == IndicatorKind::Close {
        return Some(IndicatorKey::close());
    }
    Some(IndicatorKey {
        kind,
        period: period.resolve(params)?,
    })
}
