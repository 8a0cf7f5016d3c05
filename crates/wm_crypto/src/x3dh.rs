//! X3DH asynchronous key agreement.
//!
//! The initiator fetches the responder's bundle:
//!   IK_B  (identity, Ed25519 public, converted to X25519)
//!   SPK_B (signed prekey, X25519) with IK_B's signature over it
//!   OPK_B (optional one-time prekey, X25519)
//!
//! and generates one ephemeral key EK_A:
//!   DH1 = DH(IK_A, SPK_B)
//!   DH2 = DH(EK_A, IK_B)
//!   DH3 = DH(EK_A, SPK_B)
//!   DH4 = DH(EK_A, OPK_B)   [only if the bundle carried one]
//!
//!   SK = HKDF(salt = 0*32, ikm = 0xFF*32 || DH1 || DH2 || DH3 [|| DH4], info = "wm-x3dh-v1")
//!
//! The SPK signature is verified before any DH is computed.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::{
    encoding,
    error::CryptoError,
    identity::IdentityKeyPair,
    kdf,
    prekey::{PreKeyPublic, SignedPreKeyPublic},
};

/// Convert an Ed25519 secret to an X25519 static secret (clamped SHA-512 expansion).
pub fn ed25519_secret_to_x25519(ed_secret: &[u8; 32]) -> StaticSecret {
    use sha2::{Digest, Sha512};
    let mut h = Sha512::digest(ed_secret);
    h[0] &= 248;
    h[31] &= 127;
    h[31] |= 64;
    let mut key = [0u8; 32];
    key.copy_from_slice(&h[..32]);
    h.as_mut_slice().zeroize();
    StaticSecret::from(key)
}

/// Convert an Ed25519 public key to X25519 via the Edwards to Montgomery map.
pub fn ed25519_pub_to_x25519(ed_pub: &[u8; 32]) -> Result<X25519Public, CryptoError> {
    use curve25519_dalek::edwards::CompressedEdwardsY;
    let point = CompressedEdwardsY(*ed_pub)
        .decompress()
        .ok_or_else(|| CryptoError::InvalidKey("Ed25519 public key decompression failed".into()))?;
    Ok(X25519Public::from(point.to_montgomery().to_bytes()))
}

/// A user's public key bundle, as served by `getRecipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyBundle {
    pub registration_id: u32,
    /// Base64 Ed25519 identity public key
    pub identity_key: String,
    pub signed_pre_key: SignedPreKeyPublic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_key: Option<PreKeyPublic>,
}

/// Sent with every message until the responder has answered, so the
/// responder can derive SK without a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X3dhHeader {
    /// Initiator's Ed25519 identity public key (base64)
    pub identity_key: String,
    /// Initiator's ephemeral X25519 public key (base64)
    pub base_key: String,
    pub signed_pre_key_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_key_id: Option<u32>,
}

pub struct X3dhResult {
    pub shared_key: [u8; 32],
    pub header: X3dhHeader,
}

fn derive_sk(mut ikm: Vec<u8>) -> Result<[u8; 32], CryptoError> {
    let mut sk = [0u8; 32];
    let res = kdf::hkdf_expand(&ikm, Some(&[0u8; 32]), b"wm-x3dh-v1", &mut sk);
    ikm.zeroize();
    res.map(|_| sk)
}

/// Initiator side.
pub fn initiate(my_ik: &IdentityKeyPair, bundle: &PreKeyBundle) -> Result<X3dhResult, CryptoError> {
    let ik_b_ed = encoding::b64d_32(&bundle.identity_key)?;
    bundle.signed_pre_key.verify(&ik_b_ed)?;

    let ik_a_x = ed25519_secret_to_x25519(my_ik.secret_bytes());
    let ik_b_x = ed25519_pub_to_x25519(&ik_b_ed)?;
    let spk_b = X25519Public::from(encoding::b64d_32(&bundle.signed_pre_key.public_key)?);

    let ek_a = StaticSecret::random_from_rng(OsRng);
    let ek_a_pub = X25519Public::from(&ek_a);

    let mut ikm = vec![0xFFu8; 32];
    ikm.extend_from_slice(ik_a_x.diffie_hellman(&spk_b).as_bytes());
    ikm.extend_from_slice(ek_a.diffie_hellman(&ik_b_x).as_bytes());
    ikm.extend_from_slice(ek_a.diffie_hellman(&spk_b).as_bytes());

    let mut pre_key_id = None;
    if let Some(opk) = &bundle.pre_key {
        let opk_b = X25519Public::from(encoding::b64d_32(&opk.public_key)?);
        ikm.extend_from_slice(ek_a.diffie_hellman(&opk_b).as_bytes());
        pre_key_id = Some(opk.key_id);
    }

    Ok(X3dhResult {
        shared_key: derive_sk(ikm)?,
        header: X3dhHeader {
            identity_key: my_ik.public_b64(),
            base_key: encoding::b64e(ek_a_pub.as_bytes()),
            signed_pre_key_id: bundle.signed_pre_key.key_id,
            pre_key_id,
        },
    })
}

/// Responder side. Mirrors the initiator's DH order exactly.
pub fn respond(
    my_ik: &IdentityKeyPair,
    my_spk: &StaticSecret,
    my_opk: Option<&StaticSecret>,
    header: &X3dhHeader,
) -> Result<[u8; 32], CryptoError> {
    let ek_a = X25519Public::from(encoding::b64d_32(&header.base_key)?);
    let ik_a_x = ed25519_pub_to_x25519(&encoding::b64d_32(&header.identity_key)?)?;
    let ik_b_x = ed25519_secret_to_x25519(my_ik.secret_bytes());

    let mut ikm = vec![0xFFu8; 32];
    ikm.extend_from_slice(my_spk.diffie_hellman(&ik_a_x).as_bytes());
    ikm.extend_from_slice(ik_b_x.diffie_hellman(&ek_a).as_bytes());
    ikm.extend_from_slice(my_spk.diffie_hellman(&ek_a).as_bytes());

    if let Some(opk) = my_opk {
        ikm.extend_from_slice(opk.diffie_hellman(&ek_a).as_bytes());
    }

    derive_sk(ikm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prekey::{PreKeyRecord, SignedPreKeyRecord};

    fn bundle_for(ik: &IdentityKeyPair, spk: &SignedPreKeyRecord, opk: Option<&PreKeyRecord>) -> PreKeyBundle {
        PreKeyBundle {
            registration_id: 42,
            identity_key: ik.public_b64(),
            signed_pre_key: spk.public(),
            pre_key: opk.map(PreKeyRecord::public),
        }
    }

    #[test]
    fn agreement_without_one_time_prekey() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let spk = SignedPreKeyRecord::generate(&bob, 1);

        let res = initiate(&alice, &bundle_for(&bob, &spk, None)).unwrap();
        assert_eq!(res.header.pre_key_id, None);

        let sk = respond(&bob, &spk.secret(), None, &res.header).unwrap();
        assert_eq!(res.shared_key, sk);
    }

    #[test]
    fn agreement_with_one_time_prekey() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let spk = SignedPreKeyRecord::generate(&bob, 1);
        let opk = PreKeyRecord::generate(2);

        let res = initiate(&alice, &bundle_for(&bob, &spk, Some(&opk))).unwrap();
        assert_eq!(res.header.pre_key_id, Some(2));

        let sk = respond(&bob, &spk.secret(), Some(&opk.secret()), &res.header).unwrap();
        assert_eq!(res.shared_key, sk);

        let without_opk = respond(&bob, &spk.secret(), None, &res.header).unwrap();
        assert_ne!(res.shared_key, without_opk);
    }

    #[test]
    fn rejects_signed_prekey_from_wrong_identity() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let mallory = IdentityKeyPair::generate();
        let spk = SignedPreKeyRecord::generate(&mallory, 1);

        assert!(matches!(
            initiate(&alice, &bundle_for(&bob, &spk, None)),
            Err(CryptoError::SignatureVerification)
        ));
    }
}
