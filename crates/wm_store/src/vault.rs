//! Vault: the in-memory master secret.
//!
//! Empty until a password has been verified against the canary; cleared
//! (and zeroized) on logout. Never persisted.

use std::sync::Arc;
use tokio::sync::RwLock;

use wm_crypto::kdf::MasterKey;

use crate::error::StoreError;

/// Thread-safe vault handle. Clones share the same secret.
#[derive(Clone, Default)]
pub struct Vault {
    inner: Arc<RwLock<Option<MasterKey>>>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn unlock(&self, key: MasterKey) {
        *self.inner.write().await = Some(key);
    }

    /// Drop the key. `MasterKey` zeroizes itself on drop.
    pub async fn lock(&self) {
        self.inner.write().await.take();
    }

    pub async fn is_unlocked(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Run `f` with the key, failing with `NotAuthenticated` when locked.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(key) => f(&key.0),
            None => Err(StoreError::NotAuthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locked_vault_refuses_key_access() {
        let vault = Vault::new();
        assert!(matches!(vault.with_key(|_| Ok(())).await, Err(StoreError::NotAuthenticated)));

        vault.unlock(MasterKey([1u8; 32])).await;
        assert!(vault.is_unlocked().await);
        assert_eq!(vault.with_key(|k| Ok(k[0])).await.unwrap(), 1);

        vault.lock().await;
        assert!(!vault.is_unlocked().await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = Vault::new();
        let b = a.clone();
        a.unlock(MasterKey([2u8; 32])).await;
        assert!(b.is_unlocked().await);
    }
}
