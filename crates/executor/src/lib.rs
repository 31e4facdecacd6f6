//! # Executor Crate
//!
//! The boundary between the evolution loop and whatever trades.
//!
//! ## Architectural Principles
//!
//! - **Execution Abstraction:** The `ExecutionConnector` trait lets the engine
//!   activate and deactivate strategies without knowing whether a paper book or
//!   a live broker sits behind it. The engine never places orders itself.
//! - **Never Block On Execution:** Commands go through an `ActivationQueue`;
//!   an unreachable connector leaves them queued for the next flush.
//!
//! ## Public API
//!
//! - `ExecutionConnector`: The core trait for all connectors.
//! - `PaperConnector`: An in-memory connector for paper and simulation modes.
//! - `ActivationQueue` / `ActivationCommand`: Coalescing, ordered delivery.
//! - `ExecutorError`: The specific error types that can be returned from this crate.

pub mod connector;
pub mod error;
pub mod queue;

pub use connector::{ExecutionConnector, PaperConnector};
pub use error::ExecutorError;
pub use queue::{ActivationCommand, ActivationQueue, FlushReport};
