use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Invalid fitness configuration: {0}")]
    InvalidConfig(String),
}
