use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    /// The genome cannot be activated right now. Expected; the genome is held back.
    #[error("Risk limit exceeded: {reason}")]
    RiskLimitExceeded { reason: String, available_pct: Decimal },
}
