//! wm_client — WhisperMail client core
//!
//! # Modules
//! - `app`     — `MailClient`: account lifecycle and wiring
//! - `handler` — `MessageHandler`: send, receive, threads, retry, key upkeep
//! - `sender`  — `RequestSender`: challenge-authenticated API calls
//! - `config`  — `ClientConfig`
//! - `error`   — `ClientError`

pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod sender;

pub use app::MailClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use handler::{FailedRecipient, Inbox, KeyMaintenance, MessageHandler, ReceiveFailure, SendReport};
pub use sender::RequestSender;
