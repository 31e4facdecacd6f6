use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Unknown regime label: {0}")]
    UnknownRegime(String),

    #[error("Unknown genome status: {0}")]
    UnknownStatus(String),
}
