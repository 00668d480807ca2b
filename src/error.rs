// src/error.rs
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, DatasourceError>;

/// Custom Error type for the datasource backend
#[derive(Error, Debug)]
pub enum DatasourceError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Instance error: {0}")]
    Instance(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Failed to deliver stream packet after {attempts} consecutive attempts: {reason}")]
    DeliveryFailed {
        attempts: usize,
        reason: String,
    },

    /// The owning instance was disposed while a stream was running
    #[error("datasource closed")]
    Closed,

    #[error("Other error: {0}")]
    Other(String),
}

impl DatasourceError {
    /// Whether this error is the disposal condition rather than a failure
    pub fn is_closed(&self) -> bool {
        matches!(self, DatasourceError::Closed)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DatasourceError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DatasourceError::Send(err.to_string())
    }
}
