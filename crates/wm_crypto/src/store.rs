//! The storage contract a session engine runs against.
//!
//! Implementations persist every record they are handed; the engine never
//! caches keys or sessions itself. Addresses are `user@domain` strings.

use async_trait::async_trait;

use crate::{
    error::CryptoError,
    identity::IdentityKeyPair,
    prekey::{PreKeyRecord, SignedPreKeyRecord},
};

#[async_trait]
pub trait ProtocolStore: Send + Sync {
    async fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, CryptoError>;
    async fn get_local_registration_id(&self) -> Result<u32, CryptoError>;

    async fn load_pre_key(&self, key_id: u32) -> Result<Option<PreKeyRecord>, CryptoError>;
    async fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), CryptoError>;
    async fn remove_pre_key(&self, key_id: u32) -> Result<(), CryptoError>;

    async fn load_signed_pre_key(&self, key_id: u32) -> Result<Option<SignedPreKeyRecord>, CryptoError>;
    async fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), CryptoError>;
    async fn remove_signed_pre_key(&self, key_id: u32) -> Result<(), CryptoError>;

    /// Opaque engine-owned session state.
    async fn load_session(&self, address: &str) -> Result<Option<Vec<u8>>, CryptoError>;
    async fn store_session(&self, address: &str, record: &[u8]) -> Result<(), CryptoError>;
    async fn remove_session(&self, address: &str) -> Result<(), CryptoError>;

    /// Trust on first use: an address with no pinned key is trusted.
    async fn is_trusted_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<bool, CryptoError>;

    /// Pin `identity_key` for `address` if nothing is pinned yet.
    ///
    /// Fails with [`CryptoError::UntrustedIdentity`] when a different key
    /// is already pinned; the pinned key is never overwritten.
    async fn save_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<(), CryptoError>;
}
