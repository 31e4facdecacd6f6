//! # Evolver Events
//!
//! This crate defines the notifications the evolution engine broadcasts to its
//! observers: the alerter, logs, and anything else subscribed to the channel.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the definitive
//! language for everything the engine announces.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{
    CircuitBreakerTripped, CycleFailed, EngineEvent, GenerationPublished, LogLevel, LogMessage,
    RegimeChanged,
};
