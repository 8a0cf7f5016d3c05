//! RequestSender — client side of the challenge protocol.
//!
//! Every `/api` call is two round trips: the server answers the first
//! with a one-time challenge, the second carries the challenge signed by
//! the account's API key and gets the real result.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use wm_crypto::{encoding, PreKeyBundle, PreKeyPublic, SignedPreKeyPublic};
use wm_proto::{
    api::{
        ApiRequest, ChallengeIssued, ChallengeResponse, CheckResponse, GetRecipientRequest,
        Received, RegisterRequest, SendMessageRequest, Success,
    },
    transport::post_json,
    validate, Address, Envelope, Method, Transport, API_PATH, REGISTER_PATH,
};
use wm_store::SessionStore;

use crate::error::ClientError;

#[derive(Clone)]
pub struct RequestSender {
    transport: Arc<dyn Transport>,
    server: String,
    username: String,
    keys: SessionStore,
}

fn empty() -> Value {
    Value::Object(Default::default())
}

impl RequestSender {
    pub fn new(transport: Arc<dyn Transport>, server: &str, username: &str, keys: SessionStore) -> Self {
        Self {
            transport,
            server: server.to_string(),
            username: username.to_string(),
            keys,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ClientError> {
        let resp: Success = post_json(&*self.transport, &self.server, REGISTER_PATH, request).await?;
        if !resp.success {
            return Err(ClientError::Validation("registration refused".into()));
        }
        info!(username = %request.username, server = %self.server, "registered");
        Ok(())
    }

    /// Run `method` through both challenge rounds.
    pub async fn call<P, R>(&self, method: Method, payload: &P) -> Result<R, ClientError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let request = ApiRequest {
            username: self.username.clone(),
            method: method.as_str().to_string(),
            payload: serde_json::to_value(payload)?,
        };
        let issued: ChallengeIssued = post_json(&*self.transport, &self.server, API_PATH, &request).await?;
        let challenge = validate::base64("challenge", &issued.challenge)?;

        let api_key = self.keys.api_key_pair().await?;
        let response = ApiRequest {
            username: self.username.clone(),
            method: Method::ChallengeResponse.as_str().to_string(),
            payload: serde_json::to_value(ChallengeResponse {
                challenge_id: issued.challenge_id,
                signed_challenge: encoding::b64e(&api_key.sign(&challenge)),
            })?,
        };
        let result = post_json(&*self.transport, &self.server, API_PATH, &response).await?;
        debug!(%method, "api call completed");
        Ok(result)
    }

    pub async fn check(&self) -> Result<CheckResponse, ClientError> {
        self.call(Method::Check, &empty()).await
    }

    pub async fn get_messages(&self) -> Result<Vec<Envelope>, ClientError> {
        self.call(Method::GetMessages, &empty()).await
    }

    pub async fn send_message(&self, envelope: Envelope) -> Result<(), ClientError> {
        let resp: Received = self.call(Method::SendMessage, &SendMessageRequest { envelope }).await?;
        if resp.received {
            Ok(())
        } else {
            Err(ClientError::Delivery("server did not accept the envelope".into()))
        }
    }

    pub async fn get_recipient(&self, address: &Address) -> Result<PreKeyBundle, ClientError> {
        self.call(Method::GetRecipient, &GetRecipientRequest { address: address.to_string() })
            .await
    }

    pub async fn push_pre_key(&self, pre_key: &PreKeyPublic) -> Result<(), ClientError> {
        let _: Success = self.call(Method::PushPreKey, pre_key).await?;
        Ok(())
    }

    pub async fn push_signed_pre_key(&self, signed: &SignedPreKeyPublic) -> Result<(), ClientError> {
        let _: Success = self.call(Method::PushSignedPreKey, signed).await?;
        Ok(())
    }

    pub async fn deregister(&self) -> Result<(), ClientError> {
        let _: Success = self.call(Method::Deregister, &empty()).await?;
        info!(username = %self.username, "deregistered");
        Ok(())
    }
}
