use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (wrong key or tampered ciphertext)")]
    AeadDecrypt,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("No session with {0}")]
    NoSession(String),

    #[error("Untrusted identity for {0}: pinned key does not match")]
    UntrustedIdentity(String),

    #[error("Prekey error: {0}")]
    Prekey(String),

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    #[error("Protocol store error: {0}")]
    Store(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
