//! wm_server — WhisperMail home server
//!
//! # Modules
//! - `server`    — `Server`, the transport-agnostic route dispatch
//! - `challenge` — `ChallengeHandler`, two-round signed API calls
//! - `api`       — the methods a verified caller may run
//! - `directory` — per-user registration, prekeys and mailbox rows
//! - `interop`   — federation with other home servers
//! - `http`      — axum router
//! - `config`    — `ServerConfig`
//! - `error`     — `ServerError` and its HTTP status

pub mod api;
pub mod challenge;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod interop;
pub mod server;

pub use challenge::ChallengeHandler;
pub use config::ServerConfig;
pub use directory::Directory;
pub use error::ServerError;
pub use interop::{InteropReceiver, InteropSender};
pub use server::{open_store, Server};
