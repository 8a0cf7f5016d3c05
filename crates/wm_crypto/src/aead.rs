//! Authenticated Encryption with Associated Data
//!
//! XChaCha20-Poly1305, 32-byte key, random 24-byte nonce.
//!
//! Ciphertext wire format:
//!   [ nonce (24 bytes) | ciphertext + tag ]

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

const NONCE_LEN: usize = 24;

/// Encrypt `plaintext`, prepending a random nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [3u8; 32];
        let ct = encrypt(&key, b"hello bob", b"aad").unwrap();
        assert_eq!(decrypt(&key, &ct, b"aad").unwrap().as_slice(), b"hello bob");
    }

    #[test]
    fn wrong_key_or_aad_fails() {
        let ct = encrypt(&[3u8; 32], b"hello bob", b"aad").unwrap();
        assert!(matches!(decrypt(&[4u8; 32], &ct, b"aad"), Err(CryptoError::AeadDecrypt)));
        assert!(matches!(decrypt(&[3u8; 32], &ct, b"other"), Err(CryptoError::AeadDecrypt)));
    }

    #[test]
    fn truncated_input_fails() {
        assert!(decrypt(&[3u8; 32], &[0u8; 10], b"").is_err());
    }
}
