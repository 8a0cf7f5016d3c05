//! SQLite handle via sqlx.
//!
//! The pool connects lazily and the schema is created on first use, so
//! constructing a `Database` never touches the disk. Schema creation is
//! `CREATE ... IF NOT EXISTS` only; there is no versioned migration step.

use std::path::Path;
use std::sync::Arc;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Row, SqlitePool,
};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS records (
        scope      TEXT NOT NULL,
        kind       TEXT NOT NULL,
        identifier TEXT,
        value      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS records_key ON records (scope, kind, identifier)",
    "CREATE TABLE IF NOT EXISTS messages (
        id        TEXT PRIMARY KEY,
        parent_id TEXT,
        data      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_parent ON messages (parent_id)",
];

/// A raw `records` row.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub identifier: Option<String>,
    pub value: String,
}

/// Central store handle. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    schema: Arc<OnceCell<()>>,
}

impl Database {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Self {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_lazy_with(opts);

        Self { pool, schema: Arc::new(OnceCell::new()) }
    }

    /// The pool, with the schema guaranteed to exist.
    pub async fn pool(&self) -> Result<&SqlitePool, StoreError> {
        self.schema
            .get_or_try_init(|| async {
                for stmt in SCHEMA {
                    sqlx::query(stmt).execute(&self.pool).await?;
                }
                debug!("schema ready");
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(&self.pool)
    }

    // ── records ──────────────────────────────────────────────────────────────

    /// Replace the row at `(scope, kind, identifier)`.
    pub async fn put_record(
        &self,
        scope: &str,
        kind: &str,
        identifier: Option<&str>,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().await?.begin().await?;
        sqlx::query("DELETE FROM records WHERE scope = ? AND kind = ? AND identifier IS ?")
            .bind(scope)
            .bind(kind)
            .bind(identifier)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO records (scope, kind, identifier, value) VALUES (?, ?, ?, ?)")
            .bind(scope)
            .bind(kind)
            .bind(identifier)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_record(
        &self,
        scope: &str,
        kind: &str,
        identifier: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM records WHERE scope = ? AND kind = ? AND identifier IS ?",
        )
        .bind(scope)
        .bind(kind)
        .bind(identifier)
        .fetch_optional(self.pool().await?)
        .await?;
        Ok(value)
    }

    /// All rows of `kind` in insertion order.
    pub async fn get_records(&self, scope: &str, kind: &str) -> Result<Vec<RawRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT identifier, value FROM records WHERE scope = ? AND kind = ? ORDER BY rowid",
        )
        .bind(scope)
        .bind(kind)
        .fetch_all(self.pool().await?)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RawRecord {
                    identifier: row.try_get("identifier")?,
                    value: row.try_get("value")?,
                })
            })
            .collect()
    }

    pub async fn count_records(&self, scope: &str, kind: &str) -> Result<u32, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE scope = ? AND kind = ?")
            .bind(scope)
            .bind(kind)
            .fetch_one(self.pool().await?)
            .await?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// Delete a row. Deleting a missing row is not an error.
    pub async fn remove_record(
        &self,
        scope: &str,
        kind: &str,
        identifier: Option<&str>,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM records WHERE scope = ? AND kind = ? AND identifier IS ?")
            .bind(scope)
            .bind(kind)
            .bind(identifier)
            .execute(self.pool().await?)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn remove_kind(&self, scope: &str, kind: &str) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM records WHERE scope = ? AND kind = ?")
            .bind(scope)
            .bind(kind)
            .execute(self.pool().await?)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn remove_scope(&self, scope: &str) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM records WHERE scope = ?")
            .bind(scope)
            .execute(self.pool().await?)
            .await?;
        Ok(res.rows_affected())
    }

    // ── messages ─────────────────────────────────────────────────────────────

    pub async fn put_message_row(&self, id: &str, parent_id: Option<&str>, data: &str) -> Result<(), StoreError> {
        let mut tx = self.pool().await?.begin().await?;
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO messages (id, parent_id, data) VALUES (?, ?, ?)")
            .bind(id)
            .bind(parent_id)
            .bind(data)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_message_row(&self, id: &str) -> Result<Option<String>, StoreError> {
        let data = sqlx::query_scalar::<_, String>("SELECT data FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool().await?)
            .await?;
        Ok(data)
    }

    /// Rows whose parent is `parent_id` (`None` selects roots).
    pub async fn get_message_rows(&self, parent_id: Option<&str>) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>("SELECT data FROM messages WHERE parent_id IS ? ORDER BY rowid")
            .bind(parent_id)
            .fetch_all(self.pool().await?)
            .await?;
        Ok(rows)
    }

    pub async fn child_ids(&self, parent_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>("SELECT id FROM messages WHERE parent_id = ? ORDER BY rowid")
            .bind(parent_id)
            .fetch_all(self.pool().await?)
            .await?;
        Ok(rows)
    }

    pub async fn remove_all_messages(&self) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM messages")
            .execute(self.pool().await?)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn remove_message_row(&self, id: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(self.pool().await?)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db"));
        (dir, db)
    }

    #[tokio::test]
    async fn put_replaces_row_with_same_key() {
        let (_dir, db) = temp_db();
        db.put_record("", "kind", Some("a"), "one").await.unwrap();
        db.put_record("", "kind", Some("a"), "two").await.unwrap();
        db.put_record("", "kind", None, "singleton").await.unwrap();
        db.put_record("", "kind", None, "singleton-2").await.unwrap();

        assert_eq!(db.get_record("", "kind", Some("a")).await.unwrap().as_deref(), Some("two"));
        assert_eq!(db.get_record("", "kind", None).await.unwrap().as_deref(), Some("singleton-2"));
        assert_eq!(db.count_records("", "kind").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let (_dir, db) = temp_db();
        db.put_record("alice", "info", None, "a").await.unwrap();
        db.put_record("bob", "info", None, "b").await.unwrap();
        db.remove_scope("alice").await.unwrap();
        assert!(db.get_record("alice", "info", None).await.unwrap().is_none());
        assert_eq!(db.get_record("bob", "info", None).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_dir, db) = temp_db();
        db.put_record("", "k", Some("x"), "v").await.unwrap();
        assert!(db.remove_record("", "k", Some("x")).await.unwrap());
        assert!(!db.remove_record("", "k", Some("x")).await.unwrap());
    }

    #[tokio::test]
    async fn schema_is_created_lazily_and_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.db");
        let db = Database::open(&path);
        assert!(!path.exists());
        db.pool().await.unwrap();
        db.pool().await.unwrap();
        assert!(path.exists());

        // A second handle on the same file sees the existing tables.
        let again = Database::open(&path);
        again.put_record("", "k", None, "v").await.unwrap();
    }

    #[tokio::test]
    async fn message_rows_by_parent() {
        let (_dir, db) = temp_db();
        db.put_message_row("r", None, "root").await.unwrap();
        db.put_message_row("a", Some("r"), "reply-a").await.unwrap();
        db.put_message_row("b", Some("r"), "reply-b").await.unwrap();

        assert_eq!(db.get_message_rows(None).await.unwrap(), vec!["root".to_string()]);
        assert_eq!(db.child_ids("r").await.unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(db.remove_message_row("a").await.unwrap());
        assert_eq!(db.child_ids("r").await.unwrap(), vec!["b".to_string()]);
    }
}
