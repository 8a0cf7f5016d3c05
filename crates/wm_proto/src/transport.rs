//! JSON-over-HTTP transport.
//!
//! Both the client (`/register`, `/api`) and the server's federation
//! sender (`/interop`) speak through [`Transport`], so tests can swap
//! the network for an in-process loopback.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TransportError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `path` on `host` and return the JSON answer.
    async fn post(
        &self,
        host: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;
}

/// Typed wrapper over [`Transport::post`].
pub async fn post_json<T, B, R>(transport: &T, host: &str, path: &str, body: &B) -> Result<R, TransportError>
where
    T: Transport + ?Sized,
    B: Serialize + Sync + ?Sized,
    R: DeserializeOwned,
{
    let body = serde_json::to_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    let value = transport.post(host, path, body).await?;
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

/// reqwest-backed transport. Plain `http://`; TLS is left to whatever
/// fronts the servers.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(connect: Duration, request: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .map_err(|e| TransportError::Request { host: String::new(), source: e })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        host: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let url = format!("http://{host}{path}");
        debug!(%url, "POST");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Request { host: host.to_string(), source: e })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "request rejected");
            return Err(TransportError::Status { host: host.to_string(), status: status.as_u16() });
        }

        resp.json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
