//! Session engine capability.
//!
//! `SessionEngine` is what the message layer calls to establish sessions
//! and to encrypt/decrypt per peer. The ratchet behind it is pluggable.
//!
//! `X3dhEngine` is the bundled implementation: X3DH for session setup and
//! an HKDF message-key schedule indexed by a per-direction counter. All of
//! its state lives in the [`ProtocolStore`] it is given.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    aead, encoding,
    error::CryptoError,
    kdf,
    store::ProtocolStore,
    x3dh::{self, PreKeyBundle, X3dhHeader},
};

/// Message carrying the session-establishing header.
pub const PREKEY_MESSAGE: u8 = 3;
/// Message on an established session.
pub const WHISPER_MESSAGE: u8 = 1;

const INITIATOR_CHAIN: &[u8] = b"wm-chain-initiator";
const RESPONDER_CHAIN: &[u8] = b"wm-chain-responder";
const MESSAGE_AAD: &[u8] = b"wm-session-v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherMessage {
    pub message_type: u8,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait SessionEngine: Send + Sync {
    async fn has_session(&self, address: &str) -> Result<bool, CryptoError>;

    /// Start a session with `address` from its published bundle. The
    /// bundle's identity key is pinned on first contact.
    async fn establish(&self, address: &str, bundle: &PreKeyBundle) -> Result<(), CryptoError>;

    async fn encrypt(&self, address: &str, plaintext: &[u8]) -> Result<CipherMessage, CryptoError>;

    async fn decrypt(&self, address: &str, message: &CipherMessage) -> Result<Vec<u8>, CryptoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    Initiator,
    Responder,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionState {
    role: Role,
    #[serde(with = "encoding::serde_b64_32")]
    shared_key: [u8; 32],
    base_key: String,
    send_counter: u64,
    /// Present until the peer's first reply arrives.
    pending_header: Option<X3dhHeader>,
}

impl SessionState {
    fn chains(&self) -> (&'static [u8], &'static [u8]) {
        match self.role {
            Role::Initiator => (INITIATOR_CHAIN, RESPONDER_CHAIN),
            Role::Responder => (RESPONDER_CHAIN, INITIATOR_CHAIN),
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.shared_key);
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<X3dhHeader>,
    counter: u64,
    #[serde(with = "encoding::serde_b64")]
    ciphertext: Vec<u8>,
}

pub struct X3dhEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for X3dhEngine<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: ProtocolStore> X3dhEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn load_state(&self, address: &str) -> Result<Option<SessionState>, CryptoError> {
        match self.store.load_session(address).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, address: &str, state: &SessionState) -> Result<(), CryptoError> {
        let bytes = serde_json::to_vec(state)?;
        self.store.store_session(address, &bytes).await
    }

    /// Build the responder session for an incoming prekey message.
    async fn accept(&self, address: &str, header: &X3dhHeader) -> Result<SessionState, CryptoError> {
        let remote_ik = encoding::b64d_32(&header.identity_key)?;
        self.store.save_identity(address, &remote_ik).await?;

        let identity = self.store.get_identity_key_pair().await?;
        let spk = self
            .store
            .load_signed_pre_key(header.signed_pre_key_id)
            .await?
            .ok_or_else(|| CryptoError::Prekey(format!("unknown signed prekey {}", header.signed_pre_key_id)))?;

        let opk = match header.pre_key_id {
            Some(id) => Some(
                self.store
                    .load_pre_key(id)
                    .await?
                    .ok_or_else(|| CryptoError::Prekey(format!("one-time prekey {id} already used")))?,
            ),
            None => None,
        };

        let opk_secret = opk.as_ref().map(|r| r.secret());
        let shared_key = x3dh::respond(&identity, &spk.secret(), opk_secret.as_ref(), header)?;

        Ok(SessionState {
            role: Role::Responder,
            shared_key,
            base_key: header.base_key.clone(),
            send_counter: 0,
            pending_header: None,
        })
    }
}

#[async_trait]
impl<S: ProtocolStore> SessionEngine for X3dhEngine<S> {
    async fn has_session(&self, address: &str) -> Result<bool, CryptoError> {
        Ok(self.store.load_session(address).await?.is_some())
    }

    async fn establish(&self, address: &str, bundle: &PreKeyBundle) -> Result<(), CryptoError> {
        let remote_ik = encoding::b64d_32(&bundle.identity_key)?;
        if !self.store.is_trusted_identity(address, &remote_ik).await? {
            warn!(address, "identity key changed since first contact");
            return Err(CryptoError::UntrustedIdentity(address.to_string()));
        }

        let identity = self.store.get_identity_key_pair().await?;
        let result = x3dh::initiate(&identity, bundle)?;
        self.store.save_identity(address, &remote_ik).await?;

        let state = SessionState {
            role: Role::Initiator,
            shared_key: result.shared_key,
            base_key: result.header.base_key.clone(),
            send_counter: 0,
            pending_header: Some(result.header),
        };
        self.save_state(address, &state).await?;
        debug!(address, "session established");
        Ok(())
    }

    async fn encrypt(&self, address: &str, plaintext: &[u8]) -> Result<CipherMessage, CryptoError> {
        let mut state = self
            .load_state(address)
            .await?
            .ok_or_else(|| CryptoError::NoSession(address.to_string()))?;

        let counter = state.send_counter;
        state.send_counter += 1;
        let (send_chain, _) = state.chains();
        let key = kdf::message_key(&state.shared_key, send_chain, counter)?;
        let ciphertext = aead::encrypt(&key, plaintext, MESSAGE_AAD)?;

        let wire = WireMessage {
            header: state.pending_header.clone(),
            counter,
            ciphertext,
        };
        self.save_state(address, &state).await?;

        Ok(CipherMessage {
            message_type: if wire.header.is_some() { PREKEY_MESSAGE } else { WHISPER_MESSAGE },
            body: serde_json::to_vec(&wire)?,
        })
    }

    async fn decrypt(&self, address: &str, message: &CipherMessage) -> Result<Vec<u8>, CryptoError> {
        let wire: WireMessage = serde_json::from_slice(&message.body)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;

        let existing = self.load_state(address).await?;
        let mut state = match (message.message_type, wire.header.as_ref(), existing) {
            (PREKEY_MESSAGE, Some(header), Some(state)) if state.base_key == header.base_key => state,
            (PREKEY_MESSAGE, Some(header), _) => self.accept(address, header).await?,
            (PREKEY_MESSAGE, None, _) => {
                return Err(CryptoError::Malformed("prekey message without header".into()))
            }
            (WHISPER_MESSAGE, _, Some(state)) => state,
            (WHISPER_MESSAGE, _, None) => return Err(CryptoError::NoSession(address.to_string())),
            (other, _, _) => return Err(CryptoError::Malformed(format!("unknown message type {other}"))),
        };

        let (_, recv_chain) = state.chains();
        let key = kdf::message_key(&state.shared_key, recv_chain, wire.counter)?;
        let plaintext = aead::decrypt(&key, &wire.ciphertext, MESSAGE_AAD)?;

        // A reply proves the peer holds the session; stop resending the header.
        if state.role == Role::Initiator {
            state.pending_header = None;
        }
        if let Some(id) = wire.header.as_ref().and_then(|h| h.pre_key_id) {
            if state.role == Role::Responder {
                self.store.remove_pre_key(id).await?;
            }
        }
        self.save_state(address, &state).await?;

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::IdentityKeyPair,
        prekey::{PreKeyRecord, SignedPreKeyRecord},
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory protocol store for engine tests.
    struct MemoryStore {
        identity: IdentityKeyPair,
        pre_keys: Mutex<HashMap<u32, PreKeyRecord>>,
        signed: Mutex<HashMap<u32, SignedPreKeyRecord>>,
        sessions: Mutex<HashMap<String, Vec<u8>>>,
        identities: Mutex<HashMap<String, [u8; 32]>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                identity: IdentityKeyPair::generate(),
                pre_keys: Mutex::default(),
                signed: Mutex::default(),
                sessions: Mutex::default(),
                identities: Mutex::default(),
            }
        }

        fn bundle(&self, with_opk: bool) -> PreKeyBundle {
            let spk = SignedPreKeyRecord::generate(&self.identity, 1);
            let public = spk.public();
            self.signed.lock().insert(1, spk);
            let pre_key = with_opk.then(|| {
                let opk = PreKeyRecord::generate(2);
                let public = opk.public();
                self.pre_keys.lock().insert(2, opk);
                public
            });
            PreKeyBundle {
                registration_id: 7,
                identity_key: self.identity.public_b64(),
                signed_pre_key: public,
                pre_key,
            }
        }
    }

    #[async_trait]
    impl ProtocolStore for MemoryStore {
        async fn get_identity_key_pair(&self) -> Result<IdentityKeyPair, CryptoError> {
            Ok(self.identity.clone())
        }
        async fn get_local_registration_id(&self) -> Result<u32, CryptoError> {
            Ok(7)
        }
        async fn load_pre_key(&self, key_id: u32) -> Result<Option<PreKeyRecord>, CryptoError> {
            Ok(self.pre_keys.lock().get(&key_id).cloned())
        }
        async fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), CryptoError> {
            self.pre_keys.lock().insert(record.key_id, record.clone());
            Ok(())
        }
        async fn remove_pre_key(&self, key_id: u32) -> Result<(), CryptoError> {
            self.pre_keys.lock().remove(&key_id);
            Ok(())
        }
        async fn load_signed_pre_key(&self, key_id: u32) -> Result<Option<SignedPreKeyRecord>, CryptoError> {
            Ok(self.signed.lock().get(&key_id).cloned())
        }
        async fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), CryptoError> {
            self.signed.lock().insert(record.key_id, record.clone());
            Ok(())
        }
        async fn remove_signed_pre_key(&self, key_id: u32) -> Result<(), CryptoError> {
            self.signed.lock().remove(&key_id);
            Ok(())
        }
        async fn load_session(&self, address: &str) -> Result<Option<Vec<u8>>, CryptoError> {
            Ok(self.sessions.lock().get(address).cloned())
        }
        async fn store_session(&self, address: &str, record: &[u8]) -> Result<(), CryptoError> {
            self.sessions.lock().insert(address.to_string(), record.to_vec());
            Ok(())
        }
        async fn remove_session(&self, address: &str) -> Result<(), CryptoError> {
            self.sessions.lock().remove(address);
            Ok(())
        }
        async fn is_trusted_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<bool, CryptoError> {
            Ok(self.identities.lock().get(address).map_or(true, |k| k == identity_key))
        }
        async fn save_identity(&self, address: &str, identity_key: &[u8; 32]) -> Result<(), CryptoError> {
            let mut ids = self.identities.lock();
            match ids.get(address) {
                Some(k) if k != identity_key => Err(CryptoError::UntrustedIdentity(address.to_string())),
                Some(_) => Ok(()),
                None => {
                    ids.insert(address.to_string(), *identity_key);
                    Ok(())
                }
            }
        }
    }

    fn pair() -> (X3dhEngine<MemoryStore>, X3dhEngine<MemoryStore>) {
        (
            X3dhEngine::new(Arc::new(MemoryStore::new())),
            X3dhEngine::new(Arc::new(MemoryStore::new())),
        )
    }

    #[tokio::test]
    async fn first_message_carries_header_then_reply_clears_it() {
        let (alice, bob) = pair();
        let bundle = bob.store().bundle(true);
        alice.establish("bob@b", &bundle).await.unwrap();
        assert!(alice.has_session("bob@b").await.unwrap());

        let m1 = alice.encrypt("bob@b", b"hi bob").await.unwrap();
        assert_eq!(m1.message_type, PREKEY_MESSAGE);
        assert_eq!(bob.decrypt("alice@a", &m1).await.unwrap(), b"hi bob");

        // One-time prekey is consumed by the responder.
        assert!(bob.store().pre_keys.lock().is_empty());

        let m2 = alice.encrypt("bob@b", b"again").await.unwrap();
        assert_eq!(m2.message_type, PREKEY_MESSAGE);
        assert_eq!(bob.decrypt("alice@a", &m2).await.unwrap(), b"again");

        let reply = bob.encrypt("alice@a", b"hello alice").await.unwrap();
        assert_eq!(reply.message_type, WHISPER_MESSAGE);
        assert_eq!(alice.decrypt("bob@b", &reply).await.unwrap(), b"hello alice");

        let m3 = alice.encrypt("bob@b", b"settled").await.unwrap();
        assert_eq!(m3.message_type, WHISPER_MESSAGE);
        assert_eq!(bob.decrypt("alice@a", &m3).await.unwrap(), b"settled");
    }

    #[tokio::test]
    async fn whisper_message_without_session_fails() {
        let (alice, bob) = pair();
        alice.establish("bob@b", &bob.store().bundle(false)).await.unwrap();
        let m1 = alice.encrypt("bob@b", b"hi").await.unwrap();
        let forged = CipherMessage { message_type: WHISPER_MESSAGE, body: m1.body };
        assert!(matches!(
            bob.decrypt("alice@a", &forged).await,
            Err(CryptoError::NoSession(_))
        ));
    }

    #[tokio::test]
    async fn encrypt_without_session_fails() {
        let (alice, _) = pair();
        assert!(matches!(
            alice.encrypt("nobody@x", b"hi").await,
            Err(CryptoError::NoSession(_))
        ));
    }

    #[tokio::test]
    async fn changed_identity_is_not_trusted() {
        let (alice, bob) = pair();
        alice.establish("bob@b", &bob.store().bundle(false)).await.unwrap();

        let impostor = MemoryStore::new();
        let err = alice.establish("bob@b", &impostor.bundle(false)).await.unwrap_err();
        assert!(matches!(err, CryptoError::UntrustedIdentity(_)));
    }
}
