//! # Evolver Fitness Analyzer
//!
//! Scores every genome from its realized performance records and ranks the
//! population for selection.
//!
//! ## Architectural Principles
//!
//! - **Read Only:** The evaluator only reads performance records. It never
//!   mutates them; annotated copies carry the computed fitness.
//! - **Filter, Score, Rank:** Genomes below the trade-count floor are flagged
//!   and scored exactly zero, the rest are scored by a weighted combination of
//!   normalised metrics, and the result is ranked with deterministic tie-breaks.
//! - **Regime Buckets:** Fitness is kept per regime label. Rankings compare
//!   genomes within one bucket and fall back to the aggregate score when the
//!   bucket is too thin to rank.
//!
//! ## Public API
//!
//! - `FitnessEvaluator`: computes `FitnessScore`s and `GenomeFitness` values.
//! - `rank_population`: orders a population for a regime, returning a `Ranking`.

pub mod error;
pub mod fitness;
pub mod ranking;

pub use error::AnalyzerError;
pub use fitness::{FitnessEvaluator, FitnessScore, GenomeFitness};
pub use ranking::{RankBasis, RankedGenome, Ranking, rank_population};
