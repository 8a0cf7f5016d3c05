//! Encrypted envelope — all a server ever sees of a message.
//!
//! Servers route on `recipient` and check `sender` against the calling
//! account; `data` is opaque engine output.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wm_crypto::engine::{CipherMessage, PREKEY_MESSAGE, WHISPER_MESSAGE};

use crate::{address::Address, error::ProtoError, validate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Random UUID, used as the mailbox key.
    pub id: String,
    /// 3 for a session-establishing message, 1 otherwise.
    pub signal_version: u8,
    pub sender: String,
    pub recipient: String,
    /// Base64 ciphertext.
    pub data: String,
}

impl Envelope {
    pub fn seal(sender: &Address, recipient: &Address, message: &CipherMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            signal_version: message.message_type,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            data: wm_crypto::encoding::b64e(&message.body),
        }
    }

    /// Shape check: known version, parseable addresses, base64 payload, UUID id.
    pub fn validate(&self) -> Result<(), ProtoError> {
        validate::uuid("id", &self.id)?;
        if !matches!(self.signal_version, PREKEY_MESSAGE | WHISPER_MESSAGE) {
            return Err(ProtoError::validation(format!(
                "unsupported signalVersion {}",
                self.signal_version
            )));
        }
        self.sender_address()?;
        self.recipient_address()?;
        validate::base64("data", &self.data)?;
        Ok(())
    }

    pub fn sender_address(&self) -> Result<Address, ProtoError> {
        self.sender.parse()
    }

    pub fn recipient_address(&self) -> Result<Address, ProtoError> {
        self.recipient.parse()
    }

    pub fn cipher_message(&self) -> Result<CipherMessage, ProtoError> {
        Ok(CipherMessage {
            message_type: self.signal_version,
            body: validate::base64("data", &self.data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::seal(
            &"alice@example.com".parse().unwrap(),
            &"bob@other.com".parse().unwrap(),
            &CipherMessage { message_type: PREKEY_MESSAGE, body: b"opaque".to_vec() },
        )
    }

    #[test]
    fn sealed_envelope_is_valid() {
        let env = sample();
        env.validate().unwrap();
        assert_eq!(env.cipher_message().unwrap().body, b"opaque");
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["signalVersion"], 3);
        assert!(json.get("data").is_some());
    }

    #[test]
    fn rejects_bad_fields() {
        let mut env = sample();
        env.signal_version = 2;
        assert!(env.validate().is_err());

        let mut env = sample();
        env.id = "not-a-uuid".into();
        assert!(env.validate().is_err());

        let mut env = sample();
        env.data = "***".into();
        assert!(env.validate().is_err());

        let mut env = sample();
        env.recipient = "bob".into();
        assert!(env.validate().is_err());
    }
}
