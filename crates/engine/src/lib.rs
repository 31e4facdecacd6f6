//! # Evolver Evolution Engine
//!
//! This crate drives the population of trading strategies from one generation
//! to the next. It owns population membership and nothing else: market data,
//! storage, execution and alert delivery are reached through the traits of
//! their own crates.
//!
//! ## Architectural Principles
//!
//! - **Deterministic State Machine:** A cycle always walks
//!   `COLLECTING → EVALUATING → SELECTING → BREEDING → PUBLISHING`. With a
//!   fixed seed and fixed inputs it always produces the same generation.
//! - **Atomic Publication:** The next generation is persisted first and then
//!   swapped in through a `tokio::sync::watch` channel. Readers see the old
//!   generation or the new one, never a mix. A failed cycle leaves the last
//!   known good generation live.
//! - **Fail Closed:** The daily-loss breaker retires every genome the moment it
//!   trips, before anything is written.
//! - **Never Block On Execution:** Activation commands go through a queue that
//!   is flushed opportunistically; an offline connector only delays them.
//!
//! ## Public API
//!
//! - `EvolutionEngine`: bootstrap, `collect` and `run_cycle`.
//! - `EvolutionDriver` / `DriverHandle`: the timer- and data-driven loop.
//! - `RegimeSampler`: periodic regime classification and persistence.
//! - `TradeCollector`: the trade-outcome sink.
//! - `ShadowTrader`: paper-trades the live generation on closed market candles.
//! - `Simulation`: a reproducible offline run over synthetic candles.

// Declare all the modules that constitute this crate.
pub mod collector;
pub mod driver;
pub mod error;
pub mod evolution;
pub mod generation;
pub mod phase;
pub mod retry;
pub mod sampler;
pub mod selection;
pub mod shadow;
pub mod simulation;

// Re-export the key components to create a clean, public-facing API.
pub use collector::TradeCollector;
pub use driver::{DriverHandle, EvolutionDriver};
pub use error::EngineError;
pub use evolution::{CollectReport, CycleReport, EvolutionEngine, FALLBACK_REGIME};
pub use generation::{Generation, GenerationHandle};
pub use phase::CyclePhase;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use sampler::RegimeSampler;
pub use selection::{Offspring, SelectionSettings, next_population, select_elites};
pub use shadow::ShadowTrader;
pub use simulation::{CycleSummary, Simulation, SimulationOptions};
