use thiserror::Error;

use wm_proto::{ProtoError, TransportError};
use wm_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Federation error: {0}")]
    Federation(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl ServerError {
    /// HTTP status for this error. Storage trouble is the only server-side
    /// fault; everything else is the caller's request being refused.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Storage(_) => 503,
            _ => 400,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::AlreadyExists(what) => Self::Validation(format!("{what} already exists")),
            other => Self::Storage(other),
        }
    }
}

impl From<ProtoError> for ServerError {
    fn from(err: ProtoError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}
