//! Key derivation functions
//!
//! `derive_master_key` — Argon2id, turns the account password into the
//!   32-byte master secret that seals everything persisted locally.
//!
//! `hkdf_expand` — HKDF-SHA256, used for session and message keys.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// 32-byte master secret derived from the account password. Zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey(pub [u8; 32]);

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    /// Cheap profile for tests and throwaway stores.
    pub const fn light() -> Self {
        Self { m_cost: 256, t_cost: 1, p_cost: 1 }
    }
}

impl Default for KdfParams {
    /// Tuned for interactive desktop use.
    fn default() -> Self {
        Self { m_cost: 64 * 1024, t_cost: 3, p_cost: 1 }
    }
}

/// Derive the master key from a password and a 16-byte salt.
///
/// Deterministic: the same password, salt and params always give the same key.
pub fn derive_master_key(
    password: &[u8],
    salt: &[u8],
    params: KdfParams,
) -> Result<MasterKey, CryptoError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(MasterKey(output))
}

/// Generate a fresh random 16-byte salt.
pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Random bytes for challenges and ids.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Per-message key for counter `n` of a directional chain.
pub fn message_key(shared: &[u8; 32], direction: &[u8], n: u64) -> Result<[u8; 32], CryptoError> {
    let mut info = Vec::with_capacity(direction.len() + 8);
    info.extend_from_slice(direction);
    info.extend_from_slice(&n.to_be_bytes());
    let mut key = [0u8; 32];
    hkdf_expand(shared, Some(b"wm-message-key-v1"), &info, &mut key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_is_deterministic() {
        let salt = generate_salt();
        let a = derive_master_key(b"correct-horse", &salt, KdfParams::light()).unwrap();
        let b = derive_master_key(b"correct-horse", &salt, KdfParams::light()).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn master_key_depends_on_password_and_salt() {
        let salt = generate_salt();
        let a = derive_master_key(b"correct-horse", &salt, KdfParams::light()).unwrap();
        let b = derive_master_key(b"battery-staple", &salt, KdfParams::light()).unwrap();
        let c = derive_master_key(b"correct-horse", &generate_salt(), KdfParams::light()).unwrap();
        assert_ne!(a.0, b.0);
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn message_keys_differ_per_counter_and_direction() {
        let shared = [7u8; 32];
        let k0 = message_key(&shared, b"init", 0).unwrap();
        let k1 = message_key(&shared, b"init", 1).unwrap();
        let r0 = message_key(&shared, b"resp", 0).unwrap();
        assert_ne!(k0, k1);
        assert_ne!(k0, r0);
    }
}
