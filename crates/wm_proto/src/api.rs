//! Request/response bodies for `/register` and `/api`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use wm_crypto::{PreKeyPublic, SignedPreKeyPublic};

use crate::{envelope::Envelope, error::ProtoError, validate};

// ── /register ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub name: String,
    /// Base64 Ed25519 messaging identity key
    pub public_key: String,
    pub registration_id: u32,
    /// Base64 Ed25519 key that signs challenges
    pub api_public_key: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ProtoError> {
        validate::username(&self.username)?;
        validate::non_empty("name", &self.name)?;
        validate::key("publicKey", &self.public_key)?;
        validate::key("apiPublicKey", &self.api_public_key)?;
        if self.registration_id == 0 {
            return Err(ProtoError::validation("registrationId must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub const OK: Self = Self { success: true };
}

// ── /api ─────────────────────────────────────────────────────────────────────

/// The closed set of methods reachable through `/api`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    Check,
    GetMessages,
    SendMessage,
    GetRecipient,
    PushPreKey,
    PushSignedPreKey,
    Deregister,
    ChallengeResponse,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::GetMessages => "getMessages",
            Self::SendMessage => "sendMessage",
            Self::GetRecipient => "getRecipient",
            Self::PushPreKey => "pushPreKey",
            Self::PushSignedPreKey => "pushSignedPreKey",
            Self::Deregister => "deregister",
            Self::ChallengeResponse => "challengeResponse",
        }
    }
}

impl FromStr for Method {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "check" => Self::Check,
            "getMessages" => Self::GetMessages,
            "sendMessage" => Self::SendMessage,
            "getRecipient" => Self::GetRecipient,
            "pushPreKey" => Self::PushPreKey,
            "pushSignedPreKey" => Self::PushSignedPreKey,
            "deregister" => Self::Deregister,
            "challengeResponse" => Self::ChallengeResponse,
            other => return Err(ProtoError::validation(format!("unknown method {other:?}"))),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every `/api` call. `method` stays a string on the wire so an
/// unknown name surfaces as a validation error instead of a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    pub username: String,
    pub method: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ApiRequest {
    pub fn method(&self) -> Result<Method, ProtoError> {
        self.method.parse()
    }
}

/// Round-one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIssued {
    pub challenge_id: String,
    /// Base64 nonce to sign
    pub challenge: String,
}

/// Round-two payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_id: String,
    /// Base64 Ed25519 signature over the raw challenge bytes
    pub signed_challenge: String,
}

impl ChallengeResponse {
    pub fn validate(&self) -> Result<Vec<u8>, ProtoError> {
        validate::uuid("challengeId", &self.challenge_id)?;
        validate::base64("signedChallenge", &self.signed_challenge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub pre_key_count: u32,
    pub pre_keys_low: bool,
    pub signed_pre_key_stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRecipientRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub envelope: Envelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Received {
    pub received: bool,
}

pub type PushPreKeyRequest = PreKeyPublic;
pub type PushSignedPreKeyRequest = SignedPreKeyPublic;

pub fn validate_pre_key(pk: &PreKeyPublic) -> Result<(), ProtoError> {
    validate::key("publicKey", &pk.public_key).map(|_| ())
}

pub fn validate_signed_pre_key(spk: &SignedPreKeyPublic, now: DateTime<Utc>) -> Result<(), ProtoError> {
    validate::key("publicKey", &spk.public_key)?;
    validate::base64("signature", &spk.signature)?;
    if spk.saved_at > now + chrono::Duration::minutes(5) {
        return Err(ProtoError::validation("savedAt is in the future"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_roundtrip() {
        for m in [
            Method::Check,
            Method::GetMessages,
            Method::SendMessage,
            Method::GetRecipient,
            Method::PushPreKey,
            Method::PushSignedPreKey,
            Method::Deregister,
            Method::ChallengeResponse,
        ] {
            assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
            assert_eq!(serde_json::to_value(m).unwrap(), m.as_str());
        }
    }

    #[test]
    fn unknown_method_is_a_validation_error() {
        let req: ApiRequest =
            serde_json::from_str(r#"{"username":"alice","method":"constructor","payload":{}}"#).unwrap();
        assert!(matches!(req.method(), Err(ProtoError::Validation(_))));
    }

    #[test]
    fn payload_defaults_to_null() {
        let req: ApiRequest = serde_json::from_str(r#"{"username":"alice","method":"check"}"#).unwrap();
        assert!(req.payload.is_null());
        assert_eq!(req.method().unwrap(), Method::Check);
    }

    #[test]
    fn challenge_response_validation() {
        let ok = ChallengeResponse {
            challenge_id: uuid::Uuid::new_v4().to_string(),
            signed_challenge: "AAAA".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_id = ChallengeResponse { challenge_id: "x".into(), ..ok.clone() };
        assert!(bad_id.validate().is_err());

        let bad_sig = ChallengeResponse { signed_challenge: "%%".into(), ..ok };
        assert!(bad_sig.validate().is_err());
    }

    #[test]
    fn register_request_validation() {
        let key = wm_crypto::encoding::b64e(&[5u8; 32]);
        let mut req = RegisterRequest {
            username: "alice".into(),
            name: "Alice".into(),
            public_key: key.clone(),
            registration_id: 12,
            api_public_key: key,
        };
        assert!(req.validate().is_ok());
        req.registration_id = 0;
        assert!(req.validate().is_err());
    }
}
