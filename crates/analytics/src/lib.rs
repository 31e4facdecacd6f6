//! # Evolver Analytics Engine
//!
//! This crate turns realized trade outcomes into per-window performance
//! records. It acts as the "unbiased judge" of the system: the fitness
//! evaluator only ever sees what this crate measured.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of external systems.
//!   It depends only on `core-types` (Layer 0).
//! - **Stateless Calculation:** The `PerformanceEngine` is a stateless calculator. It takes
//!   raw trade outcomes as input and produces a `PerformanceRecord` as output.
//! - **Exact Aggregation:** Records keep their gross sums so several windows can be
//!   combined into one set of metrics without re-reading trades.
//!
//! ## Public API
//!
//! - `PerformanceEngine`: computes a `PerformanceRecord` for one strategy and window,
//!   and aggregates several records into `WindowMetrics`.
//! - `dominant_regime`: tags a window with the regime that dominated it.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod window;

// Re-export the key components to create a clean, public-facing API.
pub use engine::{PerformanceEngine, WindowMetrics};
pub use error::AnalyticsError;
pub use window::dominant_regime;
