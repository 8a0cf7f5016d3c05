//! Password gate for everything persisted.
//!
//! Signup derives a master key from the password and a random salt, then
//! stores only the salt and the canary sealed under that key. Login
//! re-derives the key and accepts it iff the canary opens to the exact
//! constant. The password itself is never stored.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use wm_crypto::{
    aead, encoding,
    kdf::{self, KdfParams, MasterKey},
};

use crate::{db::Database, error::StoreError, vault::Vault};

const CANARY: &[u8] = b"whispermail-canary-v1";
const LOGIN_KIND: &str = "loginInfo";
const SEAL_AAD: &[u8] = b"wm-store-v1";

/// The local account record. The row is stored in the clear; only the
/// canary inside it is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub server_address: String,
    pub username: String,
    pub name: String,
    /// Hex-encoded 16-byte salt
    pub salt: String,
    pub canary_check: String,
}

/// Account fields supplied at signup.
#[derive(Debug, Clone)]
pub struct NewLogin {
    pub server_address: String,
    pub username: String,
    pub name: String,
}

#[derive(Clone)]
pub struct Authentication {
    db: Database,
    scope: String,
    vault: Vault,
    kdf: KdfParams,
    /// Serialises create/login/destroy so two callers cannot interleave.
    lifecycle: Arc<Mutex<()>>,
}

impl Authentication {
    pub fn new(db: Database, kdf: KdfParams) -> Self {
        Self::with_scope(db, "", kdf)
    }

    /// Keep the login record under `scope` (the server uses its own).
    pub fn with_scope(db: Database, scope: &str, kdf: KdfParams) -> Self {
        Self {
            db,
            scope: scope.to_string(),
            vault: Vault::new(),
            kdf,
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    /// Argon2id on a blocking thread; deterministic for a given password and salt.
    pub async fn derive_key(&self, password: &str, salt: &[u8]) -> Result<MasterKey, StoreError> {
        let password = zeroize::Zeroizing::new(password.as_bytes().to_vec());
        let salt = salt.to_vec();
        let params = self.kdf;
        tokio::task::spawn_blocking(move || kdf::derive_master_key(&password, &salt, params))
            .await
            .map_err(|e| StoreError::Crypto(wm_crypto::CryptoError::KeyDerivation(e.to_string())))?
            .map_err(StoreError::from)
    }

    pub async fn login_info(&self) -> Result<Option<LoginInfo>, StoreError> {
        match self.db.get_record(&self.scope, LOGIN_KIND, None).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn has_login_info(&self) -> Result<bool, StoreError> {
        Ok(self.login_info().await?.is_some())
    }

    /// Create the singleton login record and unlock with the new key.
    pub async fn create_login_info(&self, password: &str, fields: NewLogin) -> Result<LoginInfo, StoreError> {
        let _guard = self.lifecycle.lock().await;
        if self.has_login_info().await? {
            return Err(StoreError::AlreadyExists("login info".into()));
        }

        let salt = kdf::generate_salt();
        let key = self.derive_key(password, &salt).await?;
        let canary_check = self.encrypt(CANARY, Some(&key)).await?;

        let info = LoginInfo {
            server_address: fields.server_address,
            username: fields.username,
            name: fields.name,
            salt: hex::encode(salt),
            canary_check,
        };
        self.db
            .put_record(&self.scope, LOGIN_KIND, None, &serde_json::to_string(&info)?)
            .await?;
        self.vault.unlock(key).await;

        info!(username = %info.username, "login info created");
        Ok(info)
    }

    /// Verify `password` against the canary and unlock on success.
    pub async fn login(&self, password: &str) -> Result<(), StoreError> {
        let _guard = self.lifecycle.lock().await;
        if self.vault.is_unlocked().await {
            return Err(StoreError::Authentication("already logged in".into()));
        }

        let info = self
            .login_info()
            .await?
            .ok_or_else(|| StoreError::NotFound("login info".into()))?;
        let salt = hex::decode(&info.salt).map_err(|e| StoreError::Corrupt(format!("salt: {e}")))?;
        let key = self.derive_key(password, &salt).await?;

        match self.decrypt(&info.canary_check, Some(&key)).await {
            Ok(plain) if plain.as_slice() == CANARY => {
                self.vault.unlock(key).await;
                info!(username = %info.username, "logged in");
                Ok(())
            }
            _ => {
                warn!(username = %info.username, "login rejected: wrong password");
                Err(StoreError::Authentication("wrong password".into()))
            }
        }
    }

    pub async fn logout(&self) {
        self.vault.lock().await;
    }

    pub async fn authenticated(&self) -> bool {
        self.vault.is_unlocked().await
    }

    /// Remove the login record and forget the key.
    pub async fn destroy_login_info(&self) -> Result<(), StoreError> {
        let _guard = self.lifecycle.lock().await;
        self.db.remove_record(&self.scope, LOGIN_KIND, None).await?;
        self.vault.lock().await;
        Ok(())
    }

    /// Seal `plaintext` with `key`, or with the master secret when `key` is `None`.
    pub async fn encrypt(&self, plaintext: &[u8], key: Option<&MasterKey>) -> Result<String, StoreError> {
        let seal = |k: &[u8; 32]| -> Result<String, StoreError> {
            Ok(encoding::sealed_b64e(&aead::encrypt(k, plaintext, SEAL_AAD)?))
        };
        match key {
            Some(k) => seal(&k.0),
            None => self.vault.with_key(seal).await,
        }
    }

    pub async fn decrypt(&self, sealed: &str, key: Option<&MasterKey>) -> Result<zeroize::Zeroizing<Vec<u8>>, StoreError> {
        let ct = encoding::sealed_b64d(sealed)?;
        let open = |k: &[u8; 32]| -> Result<zeroize::Zeroizing<Vec<u8>>, StoreError> {
            Ok(aead::decrypt(k, &ct, SEAL_AAD)?)
        };
        match key {
            Some(k) => open(&k.0),
            None => self.vault.with_key(open).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> NewLogin {
        NewLogin {
            server_address: "example.com".into(),
            username: "alice".into(),
            name: "Alice".into(),
        }
    }

    fn auth() -> (tempfile::TempDir, Authentication) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("auth.db"));
        (dir, Authentication::new(db, KdfParams::light()))
    }

    #[tokio::test]
    async fn signup_then_login_cycle() {
        let (_dir, auth) = auth();
        assert!(!auth.has_login_info().await.unwrap());

        let info = auth.create_login_info("correct-horse", fields()).await.unwrap();
        assert_eq!(info.salt.len(), 32);
        assert!(auth.has_login_info().await.unwrap());
        assert!(auth.authenticated().await);

        auth.logout().await;
        assert!(!auth.authenticated().await);

        auth.login("correct-horse").await.unwrap();
        assert!(auth.authenticated().await);
    }

    #[tokio::test]
    async fn wrong_password_leaves_vault_locked() {
        let (_dir, auth) = auth();
        auth.create_login_info("correct-horse", fields()).await.unwrap();
        auth.logout().await;

        for wrong in ["", "correct-horse ", "Correct-horse", "battery"] {
            assert!(matches!(auth.login(wrong).await, Err(StoreError::Authentication(_))));
            assert!(!auth.authenticated().await);
        }
    }

    #[tokio::test]
    async fn second_signup_is_rejected() {
        let (_dir, auth) = auth();
        auth.create_login_info("pw", fields()).await.unwrap();
        assert!(matches!(
            auth.create_login_info("pw", fields()).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn login_while_logged_in_is_rejected() {
        let (_dir, auth) = auth();
        auth.create_login_info("pw", fields()).await.unwrap();
        assert!(matches!(auth.login("pw").await, Err(StoreError::Authentication(_))));
    }

    #[tokio::test]
    async fn login_without_record_is_not_found() {
        let (_dir, auth) = auth();
        assert!(matches!(auth.login("pw").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn encrypt_requires_key() {
        let (_dir, auth) = auth();
        assert!(matches!(auth.encrypt(b"x", None).await, Err(StoreError::NotAuthenticated)));
        assert!(matches!(auth.decrypt("AAAA", None).await, Err(StoreError::NotAuthenticated)));

        let key = auth.derive_key("pw", &[0u8; 16]).await.unwrap();
        let sealed = auth.encrypt(b"x", Some(&key)).await.unwrap();
        assert_eq!(auth.decrypt(&sealed, Some(&key)).await.unwrap().as_slice(), b"x");
    }

    #[tokio::test]
    async fn derive_key_is_deterministic() {
        let (_dir, auth) = auth();
        let a = auth.derive_key("pw", &[9u8; 16]).await.unwrap();
        let b = auth.derive_key("pw", &[9u8; 16]).await.unwrap();
        assert_eq!(a.0, b.0);
    }

    #[tokio::test]
    async fn destroy_forgets_everything() {
        let (_dir, auth) = auth();
        auth.create_login_info("pw", fields()).await.unwrap();
        auth.destroy_login_info().await.unwrap();
        assert!(!auth.has_login_info().await.unwrap());
        assert!(!auth.authenticated().await);
        auth.create_login_info("pw2", fields()).await.unwrap();
    }
}
