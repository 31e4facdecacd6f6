//! # Evolver Strategy Library
//!
//! This crate defines how a trading strategy is represented as an evolvable
//! genome, and the genetic operators that derive new genomes from old ones.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of databases,
//!   APIs, or execution. It depends only on `core-types`.
//! - **Immutable Genomes:** A `StrategyGenome` never changes after `create`.
//!   `mutate`, `crossover` and `breed` always return a new genome with its
//!   lineage recorded.
//! - **Data, Not Code:** Entry, exit and sizing rules are a `RuleGraph`, a
//!   tagged expression tree evaluated by a pure function over a `FeatureVector`.
//!   Strategies can therefore be persisted, compared and recombined.
//! - **Reproducibility:** Every operator takes the caller's RNG. Ids are drawn
//!   from it too, so a seeded run replays exactly.
//!
//! ## Public API
//!
//! The primary public components are:
//! - `StrategyGenome`, `Gene`, `GeneSpec`, `Lineage`: the genome model.
//! - `RuleGraph`, `Expr`, `Condition`: the rule language.
//! - `mutate`, `crossover`, `breed`, `resample_unique`: the genetic operators.
//! - `templates`: seed strategies for an empty population.
//! - `simulate`: a candle-replay simulator producing `TradeOutcome`s.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod genome;
pub mod indicators;
pub mod operators;
pub mod rule_graph;
pub mod simulator;
pub mod templates;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use genome::{Gene, GeneSpec, GeneValue, Lineage, Parameters, StrategyGenome};
pub use indicators::IndicatorSet;
pub use operators::{BreedSettings, breed, crossover, mutate, resample_unique};
pub use rule_graph::{
    Condition, Decision, Expr, FeatureVector, IndicatorKey, IndicatorKind, Period, RuleGraph,
};
pub use simulator::{SimulationSettings, simulate};
pub use templates::{POSITION_SIZE_GENE, STOP_LOSS_GENE, TAKE_PROFIT_GENE, Template};
