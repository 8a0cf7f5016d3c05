//! Structural validation applied before any storage or crypto work.

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::error::ProtoError;

const MAX_USERNAME_LEN: usize = 64;

pub fn uuid(field: &str, value: &str) -> Result<Uuid, ProtoError> {
    Uuid::parse_str(value).map_err(|_| ProtoError::validation(format!("{field} is not a UUID")))
}

pub fn base64(field: &str, value: &str) -> Result<Vec<u8>, ProtoError> {
    if value.is_empty() {
        return Err(ProtoError::validation(format!("{field} is empty")));
    }
    STANDARD
        .decode(value)
        .map_err(|_| ProtoError::validation(format!("{field} is not valid base64")))
}

/// Base64 that must decode to a 32-byte key.
pub fn key(field: &str, value: &str) -> Result<[u8; 32], ProtoError> {
    base64(field, value)?
        .try_into()
        .map_err(|_| ProtoError::validation(format!("{field} must be a 32-byte key")))
}

pub fn username(value: &str) -> Result<(), ProtoError> {
    let ok = !value.is_empty()
        && value.len() <= MAX_USERNAME_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'));
    if ok {
        Ok(())
    } else {
        Err(ProtoError::validation(format!("invalid username {value:?}")))
    }
}

pub fn non_empty(field: &str, value: &str) -> Result<(), ProtoError> {
    if value.trim().is_empty() {
        Err(ProtoError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(username("alice").is_ok());
        assert!(username("a.b_c-9").is_ok());
        assert!(username("").is_err());
        assert!(username("Alice").is_err());
        assert!(username("al ice").is_err());
        assert!(username("bob@other.com").is_err());
        assert!(username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn keys_must_be_32_bytes() {
        assert!(key("publicKey", &STANDARD.encode([1u8; 32])).is_ok());
        assert!(key("publicKey", &STANDARD.encode([1u8; 33])).is_err());
        assert!(key("publicKey", "not base64!").is_err());
    }

    #[test]
    fn uuids() {
        assert!(uuid("id", &Uuid::new_v4().to_string()).is_ok());
        assert!(uuid("id", "1234").is_err());
    }
}
