//! Error types for claimq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("lock {key} still held by {holder}")]
    LockBusy { key: String, holder: String },

    #[error("{0}")]
    Duplicate(String),

    #[error("stakeholder failed on claim #{number} ({kind}): {message}")]
    Handler {
        number: u64,
        kind: String,
        message: String,
    },

    #[error("malformed document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
