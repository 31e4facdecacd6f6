use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Gene '{gene}' value {value} is outside its declared range [{min}, {max}]")]
    InvalidGeneRange {
        gene: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Gene '{gene}' value '{value}' is not one of its declared choices")]
    InvalidCategory { gene: String, value: String },

    #[error("Rule graph references unknown gene '{0}'")]
    UnknownGene(String),

    #[error("Gene '{gene}' is used as {expected} but declared otherwise")]
    GeneKindMismatch { gene: String, expected: &'static str },

    #[error("Rule graph has {nodes} nodes, more than the allowed {max}")]
    ComplexityExceeded { nodes: usize, max: usize },

    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Strategy template '{0}' not found")]
    TemplateNotFound(String),
}
