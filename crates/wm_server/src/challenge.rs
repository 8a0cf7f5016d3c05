//! ChallengeHandler — server side of the challenge protocol.
//!
//! Round one stores the caller's request and answers with a random
//! challenge. Round two must carry that challenge signed with the API key
//! the user registered; only then does the stored request run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wm_crypto::{encoding, kdf::random_bytes, IdentityKeyPair};
use wm_proto::{
    api::{ApiRequest, ChallengeIssued, ChallengeResponse},
    Method,
};
use wm_store::StoreOptions;

use crate::{api::ApiCall, directory::REQUESTS, error::ServerError, server::Context};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChallenge {
    pub challenge_id: String,
    pub method: Method,
    pub payload: Value,
    /// Base64 nonce the client must sign.
    pub challenge: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ChallengeHandler {
    ctx: Arc<Context>,
}

impl ChallengeHandler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, request: ApiRequest) -> Result<Value, ServerError> {
        let method = request.method()?;
        match method {
            Method::ChallengeResponse => {
                let response: ChallengeResponse = serde_json::from_value(request.payload)?;
                self.redeem(&request.username, response).await
            }
            _ => {
                let issued = self.issue(&request.username, method, request.payload).await?;
                Ok(serde_json::to_value(issued)?)
            }
        }
    }

    /// Round one.
    pub async fn issue(&self, username: &str, method: Method, payload: Value) -> Result<ChallengeIssued, ServerError> {
        ApiCall::parse(method, &payload)?;
        self.ctx.directory.require_user(username).await?;

        let pending = PendingChallenge {
            challenge_id: Uuid::new_v4().to_string(),
            method,
            payload,
            challenge: encoding::b64e(&random_bytes::<32>()),
            issued_at: Utc::now(),
        };
        let store = self.ctx.directory.user(username);
        store
            .put(REQUESTS, Some(&pending.challenge_id), &pending, StoreOptions::SECRET_JSON)
            .await?;

        let ttl = self.ctx.config.challenge_ttl();
        let challenge_id = pending.challenge_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            match store.remove(REQUESTS, Some(&challenge_id)).await {
                Ok(true) => debug!(%challenge_id, "challenge expired"),
                Ok(false) => {}
                Err(e) => warn!(%challenge_id, error = %e, "could not drop expired challenge"),
            }
        });

        debug!(username, %method, challenge_id = %pending.challenge_id, "challenge issued");
        Ok(ChallengeIssued { challenge_id: pending.challenge_id, challenge: pending.challenge })
    }

    /// Round two.
    pub async fn redeem(&self, username: &str, response: ChallengeResponse) -> Result<Value, ServerError> {
        let signature = response.validate()?;
        let store = self.ctx.directory.user(username);

        let pending: PendingChallenge = store
            .get(REQUESTS, Some(&response.challenge_id), StoreOptions::SECRET_JSON)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("challenge {}", response.challenge_id)))?;
        store.remove(REQUESTS, Some(&response.challenge_id)).await?;

        if Utc::now() - pending.issued_at > ttl_as_chrono(self.ctx.config.challenge_ttl()) {
            return Err(ServerError::NotFound(format!("challenge {}", response.challenge_id)));
        }

        let info = self.ctx.directory.require_user(username).await?;
        let api_key = encoding::b64d_32(&info.api_public_key).map_err(|e| ServerError::Storage(e.into()))?;
        let challenge = encoding::b64d(&pending.challenge).map_err(|e| ServerError::Storage(e.into()))?;
        if IdentityKeyPair::verify(&api_key, &challenge, &signature).is_err() {
            warn!(username, challenge_id = %pending.challenge_id, "challenge signature rejected");
            return Err(ServerError::Authentication("challenge signature does not verify".into()));
        }

        info!(username, method = %pending.method, "api call authorised");
        ApiCall::parse(pending.method, &pending.payload)?
            .execute(&self.ctx, username)
            .await
    }
}

fn ttl_as_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero())
}
