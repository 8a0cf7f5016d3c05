//! Prekeys
//!
//! - One-time prekey: X25519, consumed by the first initiator that fetches it.
//! - Signed prekey: X25519, rotated on age, public half signed by the
//!   identity key so initiators can check the server did not swap it.
//!
//! Both kinds draw their ids from the same strictly increasing counter
//! owned by the protocol store.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::{encoding, error::CryptoError, identity::IdentityKeyPair};

/// Public half of a one-time prekey as published to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyPublic {
    pub key_id: u32,
    /// Base64 X25519 public key
    pub public_key: String,
}

/// Public half of a signed prekey as published to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPreKeyPublic {
    pub key_id: u32,
    /// Base64 X25519 public key
    pub public_key: String,
    /// Base64 Ed25519 signature over the raw public key bytes
    pub signature: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyRecord {
    #[zeroize(skip)]
    pub key_id: u32,
    #[zeroize(skip)]
    #[serde(with = "encoding::serde_b64_32")]
    pub public_key: [u8; 32],
    #[serde(with = "encoding::serde_b64_32")]
    private_key: [u8; 32],
}

impl PreKeyRecord {
    pub fn generate(key_id: u32) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self {
            key_id,
            public_key: X25519Public::from(&secret).to_bytes(),
            private_key: secret.to_bytes(),
        }
    }

    pub fn secret(&self) -> StaticSecret {
        StaticSecret::from(self.private_key)
    }

    pub fn public(&self) -> PreKeyPublic {
        PreKeyPublic {
            key_id: self.key_id,
            public_key: encoding::b64e(&self.public_key),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SignedPreKeyRecord {
    #[zeroize(skip)]
    pub key_id: u32,
    #[zeroize(skip)]
    #[serde(with = "encoding::serde_b64_32")]
    pub public_key: [u8; 32],
    #[serde(with = "encoding::serde_b64_32")]
    private_key: [u8; 32],
    #[zeroize(skip)]
    #[serde(with = "encoding::serde_b64")]
    pub signature: Vec<u8>,
    #[zeroize(skip)]
    pub saved_at: DateTime<Utc>,
}

impl SignedPreKeyRecord {
    /// Generate a prekey and sign its public half with `identity`.
    pub fn generate(identity: &IdentityKeyPair, key_id: u32) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self {
            key_id,
            public_key: public.to_bytes(),
            private_key: secret.to_bytes(),
            signature: identity.sign(public.as_bytes()),
            saved_at: Utc::now(),
        }
    }

    pub fn secret(&self) -> StaticSecret {
        StaticSecret::from(self.private_key)
    }

    pub fn public(&self) -> SignedPreKeyPublic {
        SignedPreKeyPublic {
            key_id: self.key_id,
            public_key: encoding::b64e(&self.public_key),
            signature: encoding::b64e(&self.signature),
            saved_at: self.saved_at,
        }
    }
}

impl SignedPreKeyPublic {
    /// Check the signature against the owner's identity public key.
    pub fn verify(&self, identity_key: &[u8]) -> Result<(), CryptoError> {
        let public = encoding::b64d_32(&self.public_key)?;
        let sig = encoding::b64d(&self.signature)?;
        IdentityKeyPair::verify(identity_key, &public, &sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_prekey_signature_verifies_against_owner() {
        let ik = IdentityKeyPair::generate();
        let spk = SignedPreKeyRecord::generate(&ik, 4);
        spk.public().verify(ik.public_key()).unwrap();

        let other = IdentityKeyPair::generate();
        assert!(spk.public().verify(other.public_key()).is_err());
    }

    #[test]
    fn record_serde_keeps_secret() {
        let pk = PreKeyRecord::generate(9);
        let back: PreKeyRecord = serde_json::from_str(&serde_json::to_string(&pk).unwrap()).unwrap();
        assert_eq!(back.key_id, 9);
        assert_eq!(X25519Public::from(&back.secret()).to_bytes(), pk.public_key);
    }
}
