//! MessageHandler — sending, receiving, threading and retry.
//!
//! Sends fan out to every recipient concurrently; one recipient failing
//! never aborts the others. The local copy is persisted before the caller
//! learns the outcome, and failed recipients are kept in a `SendFailure`
//! record until a retry reaches them.

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use wm_crypto::{CryptoError, SessionEngine};
use wm_proto::{
    message::WHISPERMAIL_VERSION, Address, Contact, Envelope, Message, SendFailure,
};
use wm_store::{EncryptedStore, SessionStore, StoreOptions};

use crate::{error::ClientError, sender::RequestSender};

pub const SEND_FAILURE: &str = "sendFailure";

/// Outcome of a send or a retry of one message.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub message: Message,
    pub failed: Vec<FailedRecipient>,
}

impl SendReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FailedRecipient {
    pub contact: Contact,
    pub reason: String,
}

/// An envelope from the mailbox that could not be opened.
#[derive(Debug, Clone)]
pub struct ReceiveFailure {
    pub envelope_id: String,
    pub sender: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Inbox {
    pub received: Vec<Message>,
    pub failed: Vec<ReceiveFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyMaintenance {
    pub pre_keys_published: u32,
    pub signed_pre_key_rotated: bool,
}

#[derive(Clone)]
pub struct MessageHandler {
    store: EncryptedStore,
    sessions: SessionStore,
    engine: Arc<dyn SessionEngine>,
    sender: RequestSender,
    me: Contact,
    address: Address,
    prekey_batch_size: u32,
}

impl MessageHandler {
    pub fn new(
        store: EncryptedStore,
        sessions: SessionStore,
        engine: Arc<dyn SessionEngine>,
        sender: RequestSender,
        address: Address,
        name: &str,
        prekey_batch_size: u32,
    ) -> Self {
        Self {
            store,
            sessions,
            engine,
            sender,
            me: Contact { name: name.to_string(), email: address.to_string() },
            address,
            prekey_batch_size,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    // ── sending ──────────────────────────────────────────────────────────────

    /// Compose and send a root message (`parent_id == None`, with subject)
    /// or a reply (subject dropped).
    pub async fn send_message(
        &self,
        parent_id: Option<&str>,
        body: &str,
        recipients: Vec<Contact>,
        subject: Option<&str>,
    ) -> Result<SendReport, ClientError> {
        if recipients.is_empty() {
            return Err(ClientError::Validation("at least one recipient is required".into()));
        }
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(recipients.len());
        for contact in recipients {
            contact.email.parse::<Address>()?;
            if seen.insert(contact.email.to_ascii_lowercase()) {
                unique.push(contact);
            }
        }
        if let Some(parent) = parent_id {
            if self.store.get_message(parent).await?.is_none() {
                return Err(ClientError::NotFound(format!("parent message {parent}")));
            }
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.map(str::to_string),
            whispermail_version: WHISPERMAIL_VERSION,
            subject: match parent_id {
                None => subject.map(str::to_string),
                Some(_) => None,
            },
            sent: Utc::now(),
            from: self.me.clone(),
            recipients: unique.clone(),
            message: body.to_string(),
            replies: Vec::new(),
        };

        let failed = self.deliver_all(&message, unique).await?;

        self.store.put_message(&message).await?;
        self.record_failures(&message.id, &failed).await?;

        info!(
            message_id = %message.id,
            recipients = message.recipients.len(),
            failed = failed.len(),
            "message sent"
        );
        Ok(SendReport { message, failed })
    }

    /// Re-attempt every outstanding `SendFailure`.
    pub async fn retry_failed_sends(&self) -> Result<Vec<SendReport>, ClientError> {
        let pending: Vec<SendFailure> = self.store.get_all(SEND_FAILURE, StoreOptions::SECRET_JSON).await?;
        let mut reports = Vec::with_capacity(pending.len());

        for failure in pending {
            let Some(message) = self.store.get_message(&failure.message_id).await? else {
                // Message deleted since; nothing left to deliver.
                self.store.remove(SEND_FAILURE, Some(&failure.message_id)).await?;
                continue;
            };
            let failed = self.deliver_all(&message, failure.recipients).await?;
            self.record_failures(&message.id, &failed).await?;
            info!(message_id = %message.id, still_failed = failed.len(), "retried send");
            reports.push(SendReport { message, failed });
        }
        Ok(reports)
    }

    pub async fn pending_failures(&self) -> Result<Vec<SendFailure>, ClientError> {
        Ok(self.store.get_all(SEND_FAILURE, StoreOptions::SECRET_JSON).await?)
    }

    async fn record_failures(&self, message_id: &str, failed: &[FailedRecipient]) -> Result<(), ClientError> {
        if failed.is_empty() {
            self.store.remove(SEND_FAILURE, Some(message_id)).await?;
        } else {
            let record = SendFailure {
                message_id: message_id.to_string(),
                recipients: failed.iter().map(|f| f.contact.clone()).collect(),
            };
            self.store
                .put(SEND_FAILURE, Some(message_id), &record, StoreOptions::SECRET_JSON)
                .await?;
        }
        Ok(())
    }

    /// Deliver to each recipient concurrently; returns the ones that failed.
    async fn deliver_all(&self, message: &Message, recipients: Vec<Contact>) -> Result<Vec<FailedRecipient>, ClientError> {
        let plaintext = serde_json::to_vec(message)?;
        let attempts = recipients.into_iter().map(|contact| {
            let plaintext = &plaintext;
            async move {
                let outcome = self.deliver_to(&contact, plaintext).await;
                (contact, outcome)
            }
        });

        let mut failed = Vec::new();
        for (contact, outcome) in join_all(attempts).await {
            if let Err(err) = outcome {
                warn!(message_id = %message.id, recipient = %contact.email, error = %err, "delivery failed");
                failed.push(FailedRecipient { contact, reason: err.to_string() });
            }
        }
        Ok(failed)
    }

    async fn deliver_to(&self, contact: &Contact, plaintext: &[u8]) -> Result<(), ClientError> {
        let recipient: Address = contact.email.parse()?;
        let peer = recipient.to_string();

        if !self.engine.has_session(&peer).await? {
            let bundle = self.sender.get_recipient(&recipient).await?;
            self.engine.establish(&peer, &bundle).await?;
        }

        let cipher = self.engine.encrypt(&peer, plaintext).await?;
        let envelope = Envelope::seal(&self.address, &recipient, &cipher);
        self.sender
            .send_message(envelope)
            .await
            .map_err(|e| match e {
                ClientError::Transport(t) => ClientError::Delivery(t.to_string()),
                other => other,
            })
    }

    // ── receiving ────────────────────────────────────────────────────────────

    /// Drain the server mailbox. Each envelope is opened independently;
    /// one that cannot be opened is reported in `Inbox::failed`. A local
    /// storage or authentication failure ends the call with an error.
    pub async fn get_new_messages(&self) -> Result<Inbox, ClientError> {
        let envelopes = self.sender.get_messages().await?;
        let mut inbox = Inbox::default();

        // Sequential: envelopes from one sender mutate the same session.
        for envelope in envelopes {
            match self.receive(&envelope).await {
                Ok(message) => inbox.received.push(message),
                // The local store is unusable; stop instead of dropping the rest.
                Err(err @ (ClientError::Storage(_) | ClientError::Authentication(_) | ClientError::Crypto(CryptoError::Store(_)))) => {
                    error!(envelope_id = %envelope.id, error = %err, "receive aborted");
                    return Err(err);
                }
                Err(err) => {
                    warn!(envelope_id = %envelope.id, sender = %envelope.sender, error = %err, "could not open envelope");
                    inbox.failed.push(ReceiveFailure {
                        envelope_id: envelope.id.clone(),
                        sender: envelope.sender.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if !inbox.received.is_empty() {
            info!(count = inbox.received.len(), "received messages");
        }
        Ok(inbox)
    }

    async fn receive(&self, envelope: &Envelope) -> Result<Message, ClientError> {
        envelope.validate()?;
        if envelope.recipient_address()? != self.address {
            return Err(ClientError::Validation(format!("envelope addressed to {}", envelope.recipient)));
        }
        let sender = envelope.sender_address()?.to_string();
        let plaintext = self.engine.decrypt(&sender, &envelope.cipher_message()?).await?;
        let mut message: Message = serde_json::from_slice(&plaintext)?;

        if message.from.email != sender {
            return Err(ClientError::Validation(format!(
                "message claims to be from {} but arrived from {sender}",
                message.from.email
            )));
        }
        message.replies.clear();
        self.store.put_message(&message).await?;
        Ok(message)
    }

    // ── local message tree ───────────────────────────────────────────────────

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, ClientError> {
        Ok(self.store.get_message(id).await?)
    }

    pub async fn get_root_messages(&self) -> Result<Vec<Message>, ClientError> {
        Ok(self.store.get_root_messages().await?)
    }

    /// `message` with `replies` filled in at every depth.
    pub async fn get_message_tree(&self, message: &Message) -> Result<Message, ClientError> {
        let mut root = message.clone();
        self.attach_replies(&mut root).await?;
        Ok(root)
    }

    fn attach_replies<'a>(&'a self, message: &'a mut Message) -> BoxFuture<'a, Result<(), ClientError>> {
        async move {
            let mut children = self.store.get_children(&message.id).await?;
            for child in children.iter_mut() {
                self.attach_replies(child).await?;
            }
            message.replies = children;
            Ok(())
        }
        .boxed()
    }

    /// Delete `message` and its whole reply subtree, depth first.
    /// Returns how many messages were removed.
    pub async fn delete_message(&self, message: &Message) -> Result<usize, ClientError> {
        let mut stack = vec![message.id.clone()];
        let mut removed = 0;
        while let Some(id) = stack.pop() {
            stack.extend(self.store.child_ids(&id).await?);
            if self.store.remove_message(&id).await? {
                removed += 1;
            }
            self.store.remove(SEND_FAILURE, Some(&id)).await?;
        }
        info!(message_id = %message.id, removed, "deleted thread");
        Ok(removed)
    }

    // ── key maintenance ──────────────────────────────────────────────────────

    /// Top up one-time prekeys and rotate the signed prekey when the
    /// server says they are low or stale.
    pub async fn check(&self) -> Result<KeyMaintenance, ClientError> {
        let status = self.sender.check().await?;
        let mut outcome = KeyMaintenance::default();

        if status.pre_keys_low {
            for _ in 0..self.prekey_batch_size {
                let record = self.sessions.generate_next_pre_key().await?;
                self.sender.push_pre_key(&record.public()).await?;
                outcome.pre_keys_published += 1;
            }
        }
        if status.signed_pre_key_stale {
            let record = self.sessions.generate_next_signed_pre_key().await?;
            self.sender.push_signed_pre_key(&record.public()).await?;
            outcome.signed_pre_key_rotated = true;
        }

        if outcome != KeyMaintenance::default() {
            info!(
                pre_keys = outcome.pre_keys_published,
                rotated = outcome.signed_pre_key_rotated,
                "published keys"
            );
        }
        Ok(outcome)
    }
}
