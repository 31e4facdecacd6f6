use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlerterError {
    #[error("Telegram API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Telegram rejected the alert with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
