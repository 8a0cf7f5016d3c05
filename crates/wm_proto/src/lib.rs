//! wm_proto — Wire types and transport for WhisperMail
//!
//! All bodies are JSON with camelCase field names.
//!
//! # Modules
//! - `api`       — `/register` and `/api` bodies, the closed `Method` set
//! - `interop`   — `/interop` bodies exchanged between servers
//! - `envelope`  — encrypted envelope (what servers route)
//! - `message`   — plaintext mail items, contacts, send failures
//! - `address`   — `user@domain` parsing
//! - `validate`  — structural checks (UUID, base64, usernames)
//! - `transport` — `Transport` trait and the reqwest implementation

pub mod address;
pub mod api;
pub mod envelope;
pub mod error;
pub mod interop;
pub mod message;
pub mod transport;
pub mod validate;

pub use address::Address;
pub use api::Method;
pub use envelope::Envelope;
pub use error::{ProtoError, TransportError};
pub use message::{Contact, Message, SendFailure};
pub use transport::{HttpTransport, Transport};

pub const REGISTER_PATH: &str = "/register";
pub const API_PATH: &str = "/api";
pub use interop::INTEROP_PATH;
