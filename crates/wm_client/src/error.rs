use thiserror::Error;

use wm_crypto::CryptoError;
use wm_proto::{ProtoError, TransportError};
use wm_store::StoreError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotAuthenticated => Self::Authentication(err.to_string()),
            StoreError::Authentication(msg) => Self::Authentication(msg),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::AlreadyExists(what) => Self::Validation(format!("{what} already exists")),
            StoreError::Crypto(e) => Self::Crypto(e),
            other => Self::Storage(other),
        }
    }
}

impl From<ProtoError> for ClientError {
    fn from(err: ProtoError) -> Self {
        Self::Validation(err.to_string())
    }
}
