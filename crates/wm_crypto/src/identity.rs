//! Long-term Ed25519 key pairs.
//!
//! Every account holds two of these:
//! - the messaging identity key, published in the prekey bundle and
//!   pinned by peers (trust on first use);
//! - the API key, used only to sign server challenges.
//!
//! Keeping them separate means a leaked API key cannot impersonate the
//! account in an encrypted session.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::{encoding, error::CryptoError};

/// Ed25519 key pair. Drop clears the secret half.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    #[serde(with = "encoding::serde_b64_32")]
    public_key: [u8; 32],
    #[serde(with = "encoding::serde_b64_32")]
    private_key: [u8; 32],
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_b64())
            .finish_non_exhaustive()
    }
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public_key: signing_key.verifying_key().to_bytes(),
            private_key: signing_key.to_bytes(),
        }
    }

    pub fn from_secret(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr = encoding::to_32(bytes)?;
        let signing_key = SigningKey::from_bytes(&arr);
        Ok(Self {
            public_key: signing_key.verifying_key().to_bytes(),
            private_key: arr,
        })
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.private_key
    }

    pub fn public_b64(&self) -> String {
        encoding::b64e(&self.public_key)
    }

    /// Sign arbitrary bytes; returns the 64-byte raw signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        SigningKey::from_bytes(&self.private_key)
            .sign(msg)
            .to_bytes()
            .to_vec()
    }

    /// Verify a signature made by any Ed25519 public key.
    ///
    /// Uses strict verification so malleable or small-order signatures
    /// are rejected.
    pub fn verify(public_key: &[u8], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_bytes(&encoding::to_32(public_key)?)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig_arr: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("signature must be 64 bytes".into()))?;
        let sig = Signature::from_bytes(&sig_arr);
        vk.verify_strict(msg, &sig)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = IdentityKeyPair::generate();
        let sig = kp.sign(b"challenge");
        IdentityKeyPair::verify(kp.public_key(), b"challenge", &sig).unwrap();
    }

    #[test]
    fn verify_rejects_other_key_and_message() {
        let kp = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let sig = kp.sign(b"challenge");
        assert!(matches!(
            IdentityKeyPair::verify(other.public_key(), b"challenge", &sig),
            Err(CryptoError::SignatureVerification)
        ));
        assert!(IdentityKeyPair::verify(kp.public_key(), b"challengf", &sig).is_err());
    }

    #[test]
    fn serde_roundtrip_keeps_secret() {
        let kp = IdentityKeyPair::generate();
        let json = serde_json::to_string(&kp).unwrap();
        let back: IdentityKeyPair = serde_json::from_str(&json).unwrap();
        assert_eq!(back.public_key(), kp.public_key());
        assert_eq!(back.sign(b"x"), kp.sign(b"x"));
    }

    #[test]
    fn from_secret_rebuilds_public_half() {
        let kp = IdentityKeyPair::generate();
        let again = IdentityKeyPair::from_secret(kp.secret_bytes()).unwrap();
        assert_eq!(again.public_key(), kp.public_key());
    }
}
