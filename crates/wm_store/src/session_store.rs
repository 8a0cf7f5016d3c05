//! SessionStore — the protocol-store contract on top of EncryptedStore.
//!
//! Every record here is sealed. Pre and signed prekeys share one
//! `preKeyIndex` counter; bumping it is a read-then-write, so it only
//! happens while holding `index_lock`. `tokio::sync::Mutex` hands the lock
//! out in FIFO order and releases it when the guard drops, including on
//! error paths.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use wm_crypto::{
    encoding, CryptoError, IdentityKeyPair, PreKeyRecord, ProtocolStore, SignedPreKeyRecord,
};

use crate::{
    error::StoreError,
    store::{EncryptedStore, StoreOptions},
};

pub const IDENTITY_KEY: &str = "identityKey";
pub const API_KEY: &str = "apiKey";
pub const REGISTRATION_ID: &str = "registrationId";
pub const PRE_KEY: &str = "preKey";
pub const SIGNED_PRE_KEY: &str = "signedPreKey";
pub const PRE_KEY_INDEX: &str = "preKeyIndex";
pub const SESSION: &str = "session";
pub const REMOTE_IDENTITY: &str = "identity";

#[derive(Clone)]
pub struct SessionStore {
    store: EncryptedStore,
    index_lock: Arc<Mutex<()>>,
    /// Guards generate-once records.
    init_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(store: EncryptedStore) -> Self {
        Self {
            store,
            index_lock: Arc::new(Mutex::new(())),
            init_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &EncryptedStore {
        &self.store
    }

    // ── generate-once records ────────────────────────────────────────────────

    async fn generate_key_pair_once(&self, kind: &str) -> Result<IdentityKeyPair, StoreError> {
        let _guard = self.init_lock.lock().await;
        if let Some(existing) = self.store.get(kind, None, StoreOptions::SECRET_JSON).await? {
            return Ok(existing);
        }
        let pair = IdentityKeyPair::generate();
        self.store.put(kind, None, &pair, StoreOptions::SECRET_JSON).await?;
        debug!(kind, "generated key pair");
        Ok(pair)
    }

    /// Generate the messaging identity key, or return the existing one.
    pub async fn generate_identity_key_pair(&self) -> Result<IdentityKeyPair, StoreError> {
        self.generate_key_pair_once(IDENTITY_KEY).await
    }

    pub async fn identity_key_pair(&self) -> Result<IdentityKeyPair, StoreError> {
        self.store
            .get(IDENTITY_KEY, None, StoreOptions::SECRET_JSON)
            .await?
            .ok_or_else(|| StoreError::NotFound("identity key pair".into()))
    }

    /// Generate the challenge-signing key, or return the existing one.
    pub async fn generate_api_key_pair(&self) -> Result<IdentityKeyPair, StoreError> {
        self.generate_key_pair_once(API_KEY).await
    }

    pub async fn api_key_pair(&self) -> Result<IdentityKeyPair, StoreError> {
        self.store
            .get(API_KEY, None, StoreOptions::SECRET_JSON)
            .await?
            .ok_or_else(|| StoreError::NotFound("API key pair".into()))
    }

    pub async fn generate_local_registration_id(&self) -> Result<u32, StoreError> {
        let _guard = self.init_lock.lock().await;
        if let Some(existing) = self.store.get(REGISTRATION_ID, None, StoreOptions::SECRET_JSON).await? {
            return Ok(existing);
        }
        let id: u32 = rand::thread_rng().gen_range(1..=16380);
        self.store.put(REGISTRATION_ID, None, &id, StoreOptions::SECRET_JSON).await?;
        Ok(id)
    }

    pub async fn local_registration_id(&self) -> Result<u32, StoreError> {
        self.store
            .get(REGISTRATION_ID, None, StoreOptions::SECRET_JSON)
            .await?
            .ok_or_else(|| StoreError::NotFound("registration id".into()))
    }

    // ── prekeys ──────────────────────────────────────────────────────────────

    /// Bump the shared counter. Caller must hold `index_lock`.
    async fn next_index(&self) -> Result<u32, StoreError> {
        let current: u32 = self
            .store
            .get(PRE_KEY_INDEX, None, StoreOptions::SECRET_JSON)
            .await?
            .unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupt("prekey index exhausted".into()))?;
        self.store.put(PRE_KEY_INDEX, None, &next, StoreOptions::SECRET_JSON).await?;
        Ok(next)
    }

    pub async fn generate_next_pre_key(&self) -> Result<PreKeyRecord, StoreError> {
        let _guard = self.index_lock.lock().await;
        let key_id = self.next_index().await?;
        let record = PreKeyRecord::generate(key_id);
        self.put_pre_key(&record).await?;
        debug!(key_id, "generated prekey");
        Ok(record)
    }

    pub async fn generate_next_signed_pre_key(&self) -> Result<SignedPreKeyRecord, StoreError> {
        let identity = self.identity_key_pair().await?;
        let _guard = self.index_lock.lock().await;
        let key_id = self.next_index().await?;
        let record = SignedPreKeyRecord::generate(&identity, key_id);
        self.put_signed_pre_key(&record).await?;
        debug!(key_id, "generated signed prekey");
        Ok(record)
    }

    async fn put_pre_key(&self, record: &PreKeyRecord) -> Result<(), StoreError> {
        let id = record.key_id.to_string();
        self.store.put(PRE_KEY, Some(&id), record, StoreOptions::SECRET_JSON).await
    }

    async fn put_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StoreError> {
        let id = record.key_id.to_string();
        self.store.put(SIGNED_PRE_KEY, Some(&id), record, StoreOptions::SECRET_JSON).await
    }

    pub async fn pre_key(&self, key_id: u32) -> Result<Option<PreKeyRecord>, StoreError> {
        self.store
            .get(PRE_KEY, Some(&key_id.to_string()), StoreOptions::SECRET_JSON)
            .await
    }

    pub async fn signed_pre_key(&self, key_id: u32) -> Result<Option<SignedPreKeyRecord>, StoreError> {
        self.store
            .get(SIGNED_PRE_KEY, Some(&key_id.to_string()), StoreOptions::SECRET_JSON)
            .await
    }

    /// The most recent signed prekey kept locally.
    pub async fn latest_signed_pre_key(&self) -> Result<Option<SignedPreKeyRecord>, StoreError> {
        let all: Vec<SignedPreKeyRecord> = self.store.get_all(SIGNED_PRE_KEY, StoreOptions::SECRET_JSON).await?;
        Ok(all.into_iter().max_by_key(|r| r.key_id))
    }

    // ── sessions ─────────────────────────────────────────────────────────────

    pub async fn session(&self, address: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let sealed: Option<String> = self.store.get(SESSION, Some(address), StoreOptions::SECRET).await?;
        sealed
            .map(|s| encoding::b64d(&s).map_err(StoreError::from))
            .transpose()
    }

    pub async fn put_session(&self, address: &str, record: &[u8]) -> Result<(), StoreError> {
        self.store
            .put(SESSION, Some(address), &encoding::b64e(record), StoreOptions::SECRET)
            .await
    }

    pub async fn contains_session(&self, address: &str) -> Result<bool, StoreError> {
        Ok(self.session(address).await?.is_some())
    }

    pub async fn delete_session(&self, address: &str) -> Result<(), StoreError> {
        self.store.remove(SESSION, Some(address)).await.map(|_| ())
    }

    // ── remote identities (trust on first use) ───────────────────────────────

    pub async fn pinned_identity(&self, address: &str) -> Result<Option<[u8; 32]>, StoreError> {
        let sealed: Option<String> = self.store.get(REMOTE_IDENTITY, Some(address), StoreOptions::SECRET).await?;
        sealed
            .map(|s| encoding::b64d_32(&s).map_err(StoreError::from))
            .transpose()
    }

    pub async fn trusts(&self, address: &str, identity_key: &[u8; 32]) -> Result<bool, StoreError> {
        Ok(match self.pinned_identity(address).await? {
            Some(pinned) => &pinned == identity_key,
            None => true,
        })
    }

    /// Pin on first sight; a mismatch is reported, never overwritten.
    pub async fn pin_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<(), CryptoError> {
        let _guard = self.init_lock.lock().await;
        match self.pinned_identity(address).await? {
            Some(pinned) if &pinned == identity_key => Ok(()),
            Some(_) => {
                warn!(address, "refusing to replace pinned identity key");
                Err(CryptoError::UntrustedIdentity(address.to_string()))
            }
            None => {
                self.store
                    .put(REMOTE_IDENTITY, Some(address), &encoding::b64e(identity_key), StoreOptions::SECRET)
                    .await?;
                debug!(address, "pinned identity key");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ProtocolStore for SessionStore {
    async fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, CryptoError> {
        Ok(self.identity_key_pair().await?)
    }

    async fn get_local_registration_id(&self) -> Result<u32, CryptoError> {
        Ok(self.local_registration_id().await?)
    }

    async fn load_pre_key(&self, key_id: u32) -> Result<Option<PreKeyRecord>, CryptoError> {
        Ok(self.pre_key(key_id).await?)
    }

    async fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), CryptoError> {
        Ok(self.put_pre_key(record).await?)
    }

    async fn remove_pre_key(&self, key_id: u32) -> Result<(), CryptoError> {
        self.store.remove(PRE_KEY, Some(&key_id.to_string())).await?;
        Ok(())
    }

    async fn load_signed_pre_key(&self, key_id: u32) -> Result<Option<SignedPreKeyRecord>, CryptoError> {
        Ok(self.signed_pre_key(key_id).await?)
    }

    async fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), CryptoError> {
        Ok(self.put_signed_pre_key(record).await?)
    }

    async fn remove_signed_pre_key(&self, key_id: u32) -> Result<(), CryptoError> {
        self.store.remove(SIGNED_PRE_KEY, Some(&key_id.to_string())).await?;
        Ok(())
    }

    async fn load_session(&self, address: &str) -> Result<Option<Vec<u8>>, CryptoError> {
        Ok(self.session(address).await?)
    }

    async fn store_session(&self, address: &str, record: &[u8]) -> Result<(), CryptoError> {
        Ok(self.put_session(address, record).await?)
    }

    async fn remove_session(&self, address: &str) -> Result<(), CryptoError> {
        Ok(self.delete_session(address).await?)
    }

    async fn is_trusted_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<bool, CryptoError> {
        Ok(self.trusts(address, identity_key).await?)
    }

    async fn save_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<(), CryptoError> {
        self.pin_identity(address, identity_key).await
    }
}
