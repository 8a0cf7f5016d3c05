//! wm_crypto — WhisperMail cryptographic primitives
//!
//! # Module layout
//! - `kdf`       — Argon2id master key, HKDF helpers
//! - `aead`      — XChaCha20-Poly1305 encrypt/decrypt
//! - `encoding`  — base64 helpers and serde adapters
//! - `identity`  — Ed25519 identity and API key pairs
//! - `prekey`    — one-time and signed X25519 prekeys
//! - `x3dh`      — asynchronous key agreement and the public bundle
//! - `store`     — `ProtocolStore`, the storage contract for a session engine
//! - `engine`    — `SessionEngine` capability and the bundled `X3dhEngine`
//! - `error`     — unified error type

pub mod aead;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod prekey;
pub mod store;
pub mod x3dh;

pub use engine::{CipherMessage, SessionEngine, X3dhEngine};
pub use error::CryptoError;
pub use identity::IdentityKeyPair;
pub use prekey::{PreKeyPublic, PreKeyRecord, SignedPreKeyPublic, SignedPreKeyRecord};
pub use store::ProtocolStore;
pub use x3dh::PreKeyBundle;
