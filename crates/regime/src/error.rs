use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegimeError {
    #[error("Invalid regime configuration: {0}")]
    InvalidConfig(String),

    #[error("Need at least {needed} candles to compute features, got {got}")]
    InsufficientCandles { needed: usize, got: usize },

    #[error("An error occurred during indicator calculation: {0}")]
    Indicator(String),
}
