use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl ProtoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {host} failed: {source}")]
    Request {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{host} answered with status {status}")]
    Status { host: String, status: u16 },

    #[error("Unreachable host: {0}")]
    Unreachable(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}
