//! wm_store — WhisperMail encrypted local storage
//!
//! Construction order is explicit and one-way:
//! `Database` → `Authentication` → `EncryptedStore` → `SessionStore`.
//!
//! # Modules
//! - `db`            — SQLite pool with lazy schema creation
//! - `vault`         — in-memory master secret
//! - `auth`          — login record, canary check, seal/open
//! - `store`         — `EncryptedStore` key/value rows and the message tree
//! - `session_store` — `SessionStore`, the protocol store for the session engine
//! - `error`         — `StoreError`

pub mod auth;
pub mod db;
pub mod error;
pub mod session_store;
pub mod store;
pub mod vault;

pub use auth::{Authentication, LoginInfo, NewLogin};
pub use db::Database;
pub use error::StoreError;
pub use session_store::SessionStore;
pub use store::{EncryptedStore, StoreOptions};
pub use vault::Vault;
