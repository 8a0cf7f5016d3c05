//! Base64 helpers.
//!
//! Key material that crosses the wire uses the standard alphabet with
//! padding. Values sealed at rest use URL-safe without padding.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};

use crate::error::CryptoError;

pub fn b64e(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn b64d(s: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(STANDARD.decode(s)?)
}

pub fn sealed_b64e(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn sealed_b64d(s: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(URL_SAFE_NO_PAD.decode(s)?)
}

pub fn to_32(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))
}

/// Decode a base64 string that must carry exactly 32 bytes.
pub fn b64d_32(s: &str) -> Result<[u8; 32], CryptoError> {
    to_32(&b64d(s)?)
}

/// Serde adapter for 32-byte keys stored as standard base64 strings.
pub mod serde_b64_32 {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::b64e(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        super::b64d_32(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter for arbitrary byte strings stored as standard base64.
pub mod serde_b64 {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::b64e(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        super::b64d(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64d_32_rejects_wrong_length() {
        assert!(b64d_32(&b64e(&[1u8; 31])).is_err());
        assert_eq!(b64d_32(&b64e(&[1u8; 32])).unwrap(), [1u8; 32]);
    }

    #[test]
    fn sealed_and_wire_alphabets_are_distinct() {
        let bytes = [0xfbu8, 0xff, 0xfe];
        assert_eq!(b64e(&bytes), "+//+");
        assert_eq!(sealed_b64e(&bytes), "-__-");
        assert!(b64d("-__-").is_err());
    }
}
