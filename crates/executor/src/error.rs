use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// The connector cannot be reached; the command should be retried later.
    #[error("Execution connector unavailable: {0}")]
    Unavailable(String),

    /// The connector refused the command; retrying will not help.
    #[error("Execution connector rejected command for {strategy_id}: {reason}")]
    Rejected { strategy_id: Uuid, reason: String },
}
