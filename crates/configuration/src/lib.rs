//! # Evolver Configuration
//!
//! Loads, validates and freezes the application configuration, and installs
//! the process-wide tracing subscriber.
//!
//! The `Config` returned by [`load_config`] is immutable. Components receive it
//! (or the section they need) through their constructors; there is no global
//! settings object.

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;
mod validate;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use error::ConfigError;
pub use settings::{
    Collections, Config, EvolutionConfig, FeatureFlags, FitnessConfig, MarketConfig, RegimeConfig,
    RiskConfig, StoreBackend, StoreConfig, TelegramConfig,
};

/// Command-line values that take precedence over file and environment sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub store_backend: Option<StoreBackend>,
    pub seed: Option<u64>,
}

/// Loads the application configuration.
///
/// Sources are layered in order: built-in defaults, the TOML file at `path`
/// (or an optional `config.toml` in the working directory), then environment
/// variables prefixed with `EVOLVER__` using `__` as the nesting separator
/// (e.g. `EVOLVER__EVOLUTION__POPULATION_SIZE=20`). The result is validated
/// before it is returned.
pub fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Config, ConfigError> {
    let file_source = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("config").required(false),
    };

    let builder = config::Config::builder()
        .add_source(file_source)
        .add_source(
            config::Environment::with_prefix("EVOLVER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let mut config = builder.try_deserialize::<Config>()?;

    if config.store.database_url.is_none() {
        config.store.database_url = std::env::var("DATABASE_URL").ok();
    }
    if let Some(backend) = overrides.store_backend {
        config.store.backend = backend;
    }
    if overrides.seed.is_some() {
        config.evolution.seed = overrides.seed;
    }

    config.validate()?;
    Ok(config)
}

impl Config {
    /// Renders the effective configuration for display.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
