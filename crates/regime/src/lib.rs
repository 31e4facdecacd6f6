//! # Evolver Market Regime Classifier
//!
//! Labels the market as trending, ranging or volatile so that fitness can be
//! compared like for like.
//!
//! ## Architectural Principles
//!
//! - **Pluggable Model:** Classification sits behind the `RegimeModel` trait.
//!   The built-in `ThresholdModel` applies fixed rules on volatility and trend
//!   strength; a learned model can replace it without touching callers.
//! - **Stable Labels:** `RegimeClassifier` adds hysteresis on top of the model.
//!   A new label must persist for N consecutive samples before it is committed.
//! - **Gap Tolerance:** When a sample is missing, the last committed label is
//!   carried forward.
//!
//! ## Public API
//!
//! - `compute_features`: volatility index and trend strength from a candle window.
//! - `RegimeModel`, `ThresholdModel`: raw classification of one sample.
//! - `RegimeClassifier`, `RegimeObservation`: hysteresis and snapshots.

pub mod classifier;
pub mod error;
pub mod features;
pub mod model;

pub use classifier::{RegimeChange, RegimeClassifier, RegimeObservation};
pub use error::RegimeError;
pub use features::compute_features;
pub use model::{RegimeModel, ThresholdModel};
