//! EncryptedStore — `(kind, identifier) -> value` rows with optional JSON
//! encoding and at-rest sealing.
//!
//! `put` is put-or-replace. Values not marked `plaintext` go through
//! [`Authentication::encrypt`] and therefore fail with `NotAuthenticated`
//! until a password has been verified.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use wm_proto::Message;

use crate::{auth::Authentication, db::Database, error::StoreError};

/// How a value is encoded and whether it is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOptions {
    /// Serialise with serde_json; otherwise the value must be a string.
    pub json: bool,
    /// Skip sealing.
    pub plaintext: bool,
}

impl StoreOptions {
    pub const SECRET: Self = Self { json: false, plaintext: false };
    pub const SECRET_JSON: Self = Self { json: true, plaintext: false };
    pub const PLAIN_JSON: Self = Self { json: true, plaintext: true };
}

#[derive(Clone)]
pub struct EncryptedStore {
    db: Database,
    auth: Authentication,
    scope: String,
}

impl EncryptedStore {
    pub fn new(db: Database, auth: Authentication) -> Self {
        Self { db, auth, scope: String::new() }
    }

    /// A view of the same tables restricted to `scope`.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            db: self.db.clone(),
            auth: self.auth.clone(),
            scope: scope.to_string(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn authentication(&self) -> &Authentication {
        &self.auth
    }

    async fn encode<T: Serialize + ?Sized>(&self, value: &T, opts: StoreOptions) -> Result<String, StoreError> {
        let raw = if opts.json {
            serde_json::to_string(value)?
        } else {
            match serde_json::to_value(value)? {
                Value::String(s) => s,
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "non-JSON value must be a string, got {other}"
                    )))
                }
            }
        };
        if opts.plaintext {
            Ok(raw)
        } else {
            self.auth.encrypt(raw.as_bytes(), None).await
        }
    }

    async fn decode<T: DeserializeOwned>(&self, stored: &str, opts: StoreOptions) -> Result<T, StoreError> {
        let raw = if opts.plaintext {
            stored.to_string()
        } else {
            let bytes = self.auth.decrypt(stored, None).await?;
            String::from_utf8(bytes.to_vec()).map_err(|e| StoreError::Corrupt(e.to_string()))?
        };
        if opts.json {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(serde_json::from_value(Value::String(raw))?)
        }
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        kind: &str,
        identifier: Option<&str>,
        value: &T,
        opts: StoreOptions,
    ) -> Result<(), StoreError> {
        let stored = self.encode(value, opts).await?;
        self.db.put_record(&self.scope, kind, identifier, &stored).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        kind: &str,
        identifier: Option<&str>,
        opts: StoreOptions,
    ) -> Result<Option<T>, StoreError> {
        match self.db.get_record(&self.scope, kind, identifier).await? {
            Some(stored) => Ok(Some(self.decode(&stored, opts).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_all<T: DeserializeOwned>(&self, kind: &str, opts: StoreOptions) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for (_, value) in self.get_all_entries(kind, opts).await? {
            out.push(value);
        }
        Ok(out)
    }

    /// `(identifier, value)` pairs in insertion order.
    pub async fn get_all_entries<T: DeserializeOwned>(
        &self,
        kind: &str,
        opts: StoreOptions,
    ) -> Result<Vec<(Option<String>, T)>, StoreError> {
        let rows = self.db.get_records(&self.scope, kind).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let value = self.decode(&row.value, opts).await?;
            out.push((row.identifier, value));
        }
        Ok(out)
    }

    pub async fn count(&self, kind: &str) -> Result<u32, StoreError> {
        self.db.count_records(&self.scope, kind).await
    }

    /// Idempotent; returns whether a row was removed.
    pub async fn remove(&self, kind: &str, identifier: Option<&str>) -> Result<bool, StoreError> {
        self.db.remove_record(&self.scope, kind, identifier).await
    }

    pub async fn remove_all(&self, kind: &str) -> Result<u64, StoreError> {
        self.db.remove_kind(&self.scope, kind).await
    }

    /// Remove every record in this view's scope.
    pub async fn remove_scope(&self) -> Result<u64, StoreError> {
        self.db.remove_scope(&self.scope).await
    }

    // ── message tree ─────────────────────────────────────────────────────────

    /// Messages are always sealed JSON. `replies` is never stored.
    pub async fn put_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut stored = message.clone();
        stored.replies.clear();
        let data = self.encode(&stored, StoreOptions::SECRET_JSON).await?;
        self.db
            .put_message_row(&message.id, message.parent_id.as_deref(), &data)
            .await
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        match self.db.get_message_row(id).await? {
            Some(data) => Ok(Some(self.decode(&data, StoreOptions::SECRET_JSON).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_children(&self, parent_id: &str) -> Result<Vec<Message>, StoreError> {
        self.decode_messages(self.db.get_message_rows(Some(parent_id)).await?).await
    }

    pub async fn get_root_messages(&self) -> Result<Vec<Message>, StoreError> {
        self.decode_messages(self.db.get_message_rows(None).await?).await
    }

    pub async fn child_ids(&self, parent_id: &str) -> Result<Vec<String>, StoreError> {
        self.db.child_ids(parent_id).await
    }

    pub async fn remove_message(&self, id: &str) -> Result<bool, StoreError> {
        self.db.remove_message_row(id).await
    }

    async fn decode_messages(&self, rows: Vec<String>) -> Result<Vec<Message>, StoreError> {
        let mut out = Vec::with_capacity(rows.len());
        for data in rows {
            out.push(self.decode(&data, StoreOptions::SECRET_JSON).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NewLogin;
    use serde::Deserialize;
    use wm_crypto::kdf::KdfParams;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Thing {
        a: u32,
        b: String,
    }

    async fn store() -> (tempfile::TempDir, EncryptedStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("store.db"));
        let auth = Authentication::new(db.clone(), KdfParams::light());
        auth.create_login_info(
            "pw",
            NewLogin { server_address: "example.com".into(), username: "alice".into(), name: "Alice".into() },
        )
        .await
        .unwrap();
        (dir, EncryptedStore::new(db, auth))
    }

    #[tokio::test]
    async fn json_roundtrip_sealed_and_plain() {
        let (_dir, store) = store().await;
        let thing = Thing { a: 1, b: "x".into() };

        store.put("thing", Some("1"), &thing, StoreOptions::SECRET_JSON).await.unwrap();
        store.put("thing", Some("2"), &thing, StoreOptions::PLAIN_JSON).await.unwrap();

        let sealed: Thing = store.get("thing", Some("1"), StoreOptions::SECRET_JSON).await.unwrap().unwrap();
        let plain: Thing = store.get("thing", Some("2"), StoreOptions::PLAIN_JSON).await.unwrap().unwrap();
        assert_eq!(sealed, thing);
        assert_eq!(plain, thing);
    }

    #[tokio::test]
    async fn sealed_rows_are_not_readable_on_disk() {
        let (_dir, store) = store().await;
        store.put("secret", None, "top secret value", StoreOptions::SECRET).await.unwrap();
        let raw = store.db.get_record("", "secret", None).await.unwrap().unwrap();
        assert!(!raw.contains("top secret"));

        let back: String = store.get("secret", None, StoreOptions::SECRET).await.unwrap().unwrap();
        assert_eq!(back, "top secret value");
    }

    #[tokio::test]
    async fn sealed_write_fails_when_logged_out() {
        let (_dir, store) = store().await;
        store.authentication().logout().await;
        assert!(matches!(
            store.put("secret", None, "v", StoreOptions::SECRET).await,
            Err(StoreError::NotAuthenticated)
        ));
        store.put("open", None, &1u32, StoreOptions::PLAIN_JSON).await.unwrap();
    }

    #[tokio::test]
    async fn non_json_values_must_be_strings() {
        let (_dir, store) = store().await;
        assert!(store.put("n", None, &5u32, StoreOptions::SECRET).await.is_err());
    }

    #[tokio::test]
    async fn entries_and_remove() {
        let (_dir, store) = store().await;
        for i in 0..3u32 {
            store.put("n", Some(&i.to_string()), &i, StoreOptions::SECRET_JSON).await.unwrap();
        }
        let entries: Vec<(Option<String>, u32)> = store.get_all_entries("n", StoreOptions::SECRET_JSON).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], (Some("2".into()), 2));

        assert!(store.remove("n", Some("1")).await.unwrap());
        assert!(!store.remove("n", Some("1")).await.unwrap());
        let all: Vec<u32> = store.get_all("n", StoreOptions::SECRET_JSON).await.unwrap();
        assert_eq!(all, vec![0, 2]);
    }

    #[tokio::test]
    async fn scoped_views_do_not_overlap() {
        let (_dir, store) = store().await;
        let alice = store.scoped("alice");
        let bob = store.scoped("bob");
        alice.put("info", None, "a", StoreOptions::SECRET).await.unwrap();
        assert!(bob.get::<String>("info", None, StoreOptions::SECRET).await.unwrap().is_none());
        assert_eq!(alice.remove_scope().await.unwrap(), 1);
    }
}
