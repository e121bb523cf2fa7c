use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrendError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate trend: {0}")]
    Duplicate(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for TrendError {
    fn from(err: std::io::Error) -> Self {
        TrendError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TrendError {
    fn from(err: serde_json::Error) -> Self {
        TrendError::Storage(err.to_string())
    }
}

impl From<uuid::Error> for TrendError {
    fn from(err: uuid::Error) -> Self {
        TrendError::Validation(err.to_string())
    }
}
