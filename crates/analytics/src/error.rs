use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Evaluation window is empty or inverted: {start} .. {end}")]
    InvalidWindow { start: String, end: String },

    #[error("Error in calculation: {0}")]
    Calculation(String),
}
