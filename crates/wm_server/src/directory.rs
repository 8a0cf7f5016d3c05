//! Per-user server records, each scoped by username:
//!
//! | kind           | identifier   | value              |
//! |----------------|--------------|--------------------|
//! | `info`         | —            | `UserInfo`         |
//! | `preKey`       | key id       | `PreKeyPublic`     |
//! | `signedPreKey` | —            | `SignedPreKeyPublic` (current only) |
//! | `requests`     | challenge id | `PendingChallenge` |
//! | `mailbox`      | envelope id  | `Envelope`         |
//!
//! Everything is sealed under the server's admin key.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use wm_crypto::{PreKeyBundle, PreKeyPublic, SignedPreKeyPublic};
use wm_proto::{api::RegisterRequest, Envelope};
use wm_store::{EncryptedStore, StoreOptions};

use crate::error::ServerError;

pub const INFO: &str = "info";
pub const PRE_KEY: &str = "preKey";
pub const SIGNED_PRE_KEY: &str = "signedPreKey";
pub const REQUESTS: &str = "requests";
pub const MAILBOX: &str = "mailbox";

/// Public registration record; immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: String,
    pub name: String,
    pub public_key: String,
    pub registration_id: u32,
    pub api_public_key: String,
}

impl From<RegisterRequest> for UserInfo {
    fn from(req: RegisterRequest) -> Self {
        Self {
            username: req.username,
            name: req.name,
            public_key: req.public_key,
            registration_id: req.registration_id,
            api_public_key: req.api_public_key,
        }
    }
}

#[derive(Clone)]
pub struct Directory {
    store: EncryptedStore,
    register_lock: Arc<Mutex<()>>,
    /// Two fetchers must never be handed the same one-time prekey.
    pre_key_lock: Arc<Mutex<()>>,
    /// Two drains must never return the same envelope.
    mailbox_lock: Arc<Mutex<()>>,
}

impl Directory {
    pub fn new(store: EncryptedStore) -> Self {
        Self {
            store,
            register_lock: Arc::new(Mutex::new(())),
            pre_key_lock: Arc::new(Mutex::new(())),
            mailbox_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn user(&self, username: &str) -> EncryptedStore {
        self.store.scoped(username)
    }

    pub async fn user_info(&self, username: &str) -> Result<Option<UserInfo>, ServerError> {
        Ok(self.user(username).get(INFO, None, StoreOptions::SECRET_JSON).await?)
    }

    pub async fn require_user(&self, username: &str) -> Result<UserInfo, ServerError> {
        self.user_info(username)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("user {username}")))
    }

    pub async fn register(&self, info: UserInfo) -> Result<(), ServerError> {
        let _guard = self.register_lock.lock().await;
        if self.user_info(&info.username).await?.is_some() {
            return Err(ServerError::Validation(format!("username {} is taken", info.username)));
        }
        self.user(&info.username)
            .put(INFO, None, &info, StoreOptions::SECRET_JSON)
            .await?;
        info!(username = %info.username, "user registered");
        Ok(())
    }

    pub async fn deregister(&self, username: &str) -> Result<(), ServerError> {
        let removed = self.user(username).remove_scope().await?;
        info!(username, removed, "user deregistered");
        Ok(())
    }

    // ── prekeys ──────────────────────────────────────────────────────────────

    pub async fn push_pre_key(&self, username: &str, pre_key: &PreKeyPublic) -> Result<(), ServerError> {
        self.user(username)
            .put(PRE_KEY, Some(&pre_key.key_id.to_string()), pre_key, StoreOptions::SECRET_JSON)
            .await?;
        Ok(())
    }

    pub async fn pre_key_count(&self, username: &str) -> Result<u32, ServerError> {
        Ok(self.user(username).count(PRE_KEY).await?)
    }

    /// Remove and return the lowest-id one-time prekey, if any is left.
    pub async fn take_pre_key(&self, username: &str) -> Result<Option<PreKeyPublic>, ServerError> {
        let _guard = self.pre_key_lock.lock().await;
        let store = self.user(username);
        let all: Vec<PreKeyPublic> = store.get_all(PRE_KEY, StoreOptions::SECRET_JSON).await?;
        let Some(lowest) = all.into_iter().min_by_key(|pk| pk.key_id) else {
            return Ok(None);
        };
        store.remove(PRE_KEY, Some(&lowest.key_id.to_string())).await?;
        debug!(username, key_id = lowest.key_id, "one-time prekey handed out");
        Ok(Some(lowest))
    }

    /// Replace the current signed prekey.
    pub async fn set_signed_pre_key(&self, username: &str, signed: &SignedPreKeyPublic) -> Result<(), ServerError> {
        self.user(username)
            .put(SIGNED_PRE_KEY, None, signed, StoreOptions::SECRET_JSON)
            .await?;
        Ok(())
    }

    pub async fn signed_pre_key(&self, username: &str) -> Result<Option<SignedPreKeyPublic>, ServerError> {
        Ok(self.user(username).get(SIGNED_PRE_KEY, None, StoreOptions::SECRET_JSON).await?)
    }

    /// Public bundle for `username`, consuming one one-time prekey.
    pub async fn bundle(&self, username: &str) -> Result<PreKeyBundle, ServerError> {
        let info = self.require_user(username).await?;
        let signed_pre_key = self
            .signed_pre_key(username)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("signed prekey for {username}")))?;
        let pre_key = self.take_pre_key(username).await?;
        Ok(PreKeyBundle {
            registration_id: info.registration_id,
            identity_key: info.public_key,
            signed_pre_key,
            pre_key,
        })
    }

    // ── mailbox ──────────────────────────────────────────────────────────────

    pub async fn deliver(&self, username: &str, envelope: &Envelope) -> Result<(), ServerError> {
        self.require_user(username).await?;
        self.user(username)
            .put(MAILBOX, Some(&envelope.id), envelope, StoreOptions::SECRET_JSON)
            .await?;
        debug!(username, envelope_id = %envelope.id, "envelope queued");
        Ok(())
    }

    /// Everything queued for `username`, oldest first; returned envelopes
    /// are removed.
    pub async fn drain_mailbox(&self, username: &str) -> Result<Vec<Envelope>, ServerError> {
        let _guard = self.mailbox_lock.lock().await;
        let store = self.user(username);
        let entries: Vec<(Option<String>, Envelope)> = store.get_all_entries(MAILBOX, StoreOptions::SECRET_JSON).await?;
        let mut out = Vec::with_capacity(entries.len());
        for (id, envelope) in entries {
            store.remove(MAILBOX, id.as_deref()).await?;
            out.push(envelope);
        }
        Ok(out)
    }
}
