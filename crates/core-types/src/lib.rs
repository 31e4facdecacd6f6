//! # Evolver Core Types
//!
//! The shared data model of the strategy-evolution system. Every other crate in
//! the workspace speaks in these types.
//!
//! ## Architectural Principles
//!
//! - **Layer 0:** This crate depends on nothing else in the workspace. It only
//!   describes data; behaviour lives in the crates that own each concern.
//! - **Immutable Records:** Trade outcomes, regime snapshots and performance
//!   records are produced once and then only read. None of them expose mutators.

pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{AssetClass, GenomeStatus, OrderSide, RegimeLabel, TradingMode};
pub use error::CoreError;
pub use structs::{
    Candle, EvaluationWindow, MarketFeatures, MarketRegimeSnapshot, PerformanceRecord,
    RiskEnvelope, TradeOutcome,
};
