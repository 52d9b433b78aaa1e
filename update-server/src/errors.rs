use crate::history_source::HistorySourceError;
use acquisition::AcquisitionError;
use thiserror::Error;

/// Result type alias for update-server operations
pub type Result<T, E = UpdateServerError> = std::result::Result<T, E>;

/// Errors that can occur while serving update checks and status reports
#[derive(Error, Debug)]
pub enum UpdateServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Response serialization error: {0}")]
    ResponseSerializationError(#[from] serde_json::Error),

    #[error("History source error: {0}")]
    HistorySource(#[from] HistorySourceError),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
}
