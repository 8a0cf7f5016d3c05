//! Methods reachable through `/api` once the caller has passed the
//! challenge, and what each one does.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use wm_crypto::{encoding, PreKeyPublic, SignedPreKeyPublic};
use wm_proto::{
    api::{
        validate_pre_key, validate_signed_pre_key, CheckResponse, GetRecipientRequest, Received,
        SendMessageRequest, Success,
    },
    Address, Method,
};

use crate::{error::ServerError, server::Context};

/// A method together with its already-decoded payload.
#[derive(Debug, Clone)]
pub enum ApiCall {
    Check,
    GetMessages,
    SendMessage(SendMessageRequest),
    GetRecipient(Address),
    PushPreKey(PreKeyPublic),
    PushSignedPreKey(SignedPreKeyPublic),
    Deregister,
}

impl ApiCall {
    /// Decode and structurally validate `payload` for `method`.
    pub fn parse(method: Method, payload: &Value) -> Result<Self, ServerError> {
        let call = match method {
            Method::Check => Self::Check,
            Method::GetMessages => Self::GetMessages,
            Method::Deregister => Self::Deregister,
            Method::SendMessage => {
                let req: SendMessageRequest = serde_json::from_value(payload.clone())?;
                req.envelope.validate()?;
                Self::SendMessage(req)
            }
            Method::GetRecipient => {
                let req: GetRecipientRequest = serde_json::from_value(payload.clone())?;
                Self::GetRecipient(req.address.parse()?)
            }
            Method::PushPreKey => {
                let pk: PreKeyPublic = serde_json::from_value(payload.clone())?;
                validate_pre_key(&pk)?;
                Self::PushPreKey(pk)
            }
            Method::PushSignedPreKey => {
                let spk: SignedPreKeyPublic = serde_json::from_value(payload.clone())?;
                validate_signed_pre_key(&spk, Utc::now())?;
                Self::PushSignedPreKey(spk)
            }
            Method::ChallengeResponse => {
                return Err(ServerError::Validation("challengeResponse without a pending call".into()))
            }
        };
        Ok(call)
    }

    /// Run the call on behalf of `username`.
    pub async fn execute(self, ctx: &Context, username: &str) -> Result<Value, ServerError> {
        let directory = &ctx.directory;
        let value = match self {
            Self::Check => {
                let pre_key_count = directory.pre_key_count(username).await?;
                let signed_pre_key_stale = match directory.signed_pre_key(username).await? {
                    Some(spk) => Utc::now() - spk.saved_at > ctx.config.signed_prekey_max_age(),
                    None => true,
                };
                serde_json::to_value(CheckResponse {
                    pre_key_count,
                    pre_keys_low: pre_key_count < ctx.config.prekey_low_threshold,
                    signed_pre_key_stale,
                })?
            }
            Self::GetMessages => {
                let envelopes = directory.drain_mailbox(username).await?;
                debug!(username, count = envelopes.len(), "mailbox drained");
                serde_json::to_value(envelopes)?
            }
            Self::SendMessage(SendMessageRequest { envelope }) => {
                let sender = envelope.sender_address()?;
                if sender.username != username || !sender.is_local_to(&ctx.config.domain) {
                    return Err(ServerError::Protocol(format!(
                        "{username} cannot send as {}",
                        envelope.sender
                    )));
                }
                let recipient = envelope.recipient_address()?;
                if recipient.is_local_to(&ctx.config.domain) {
                    directory.deliver(&recipient.username, &envelope).await?;
                } else {
                    ctx.interop.send_message(&recipient, &envelope).await?;
                }
                info!(username, recipient = %recipient, envelope_id = %envelope.id, "envelope accepted");
                serde_json::to_value(Received { received: true })?
            }
            Self::GetRecipient(address) => {
                let bundle = if address.is_local_to(&ctx.config.domain) {
                    directory.bundle(&address.username).await?
                } else {
                    ctx.interop.get_recipient(&address).await?
                };
                serde_json::to_value(bundle)?
            }
            Self::PushPreKey(pk) => {
                directory.push_pre_key(username, &pk).await?;
                serde_json::to_value(Success::OK)?
            }
            Self::PushSignedPreKey(spk) => {
                let info = directory.require_user(username).await?;
                let identity = encoding::b64d_32(&info.public_key)
                    .map_err(|e| ServerError::Validation(e.to_string()))?;
                spk.verify(&identity)
                    .map_err(|_| ServerError::Validation("signed prekey signature does not verify".into()))?;
                directory.set_signed_pre_key(username, &spk).await?;
                serde_json::to_value(Success::OK)?
            }
            Self::Deregister => {
                directory.deregister(username).await?;
                serde_json::to_value(Success::OK)?
            }
        };
        Ok(value)
    }
}
