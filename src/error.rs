//! Error types for territory-engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerritoryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers to decide how to surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transient,
    InvalidRegion,
    Internal,
}

impl TerritoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TerritoryError::Validation(_) => ErrorKind::Validation,
            TerritoryError::NotFound(_) => ErrorKind::NotFound,
            TerritoryError::Store(_) | TerritoryError::Timeout(_) | TerritoryError::Io(_) => {
                ErrorKind::Transient
            }
            TerritoryError::InvalidRegion(_) => ErrorKind::InvalidRegion,
            // Json only arises from the stored column codecs
            TerritoryError::Config(_) | TerritoryError::Json(_) | TerritoryError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Validation and not-found errors are never worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, TerritoryError::Store(_) | TerritoryError::Timeout(_))
    }
}
