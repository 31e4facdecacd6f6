use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A transient store failure outlasted every retry.
    #[error("Store unavailable during {operation} after {attempts} attempts: {reason}")]
    StoreUnavailable {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Fitness evaluation error: {0}")]
    Analyzer(#[from] analyzer::AnalyzerError),

    #[error("Performance calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Regime classification error: {0}")]
    Regime(#[from] regime::RegimeError),

    #[error("Market data error: {0}")]
    MarketData(#[from] api_client::ApiError),

    #[error("Trade collector is no longer running")]
    CollectorClosed,

    /// Something that must never reach publication did. Fatal to the cycle only.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}
