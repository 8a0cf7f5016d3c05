//! Federation between home servers over `/interop`.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use wm_crypto::PreKeyBundle;
use wm_proto::{
    api::Received,
    interop::{InteropGetRecipient, InteropMethod, InteropRequest},
    transport::post_json,
    validate, Address, Envelope, Transport, INTEROP_PATH,
};

use crate::{directory::Directory, error::ServerError};

/// Outbound half: asks other servers for bundles and hands them envelopes.
#[derive(Clone)]
pub struct InteropSender {
    transport: Arc<dyn Transport>,
}

impl InteropSender {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn get_recipient(&self, address: &Address) -> Result<PreKeyBundle, ServerError> {
        let payload = serde_json::to_value(InteropGetRecipient { username: address.username.clone() })?;
        let request = InteropRequest::new(InteropMethod::GetRecipient, payload);
        debug!(recipient = %address, "fetching remote bundle");
        Ok(post_json(&*self.transport, &address.domain, INTEROP_PATH, &request).await?)
    }

    pub async fn send_message(&self, recipient: &Address, envelope: &Envelope) -> Result<(), ServerError> {
        let request = InteropRequest::new(InteropMethod::SendMessage, serde_json::to_value(envelope)?);
        let resp: Received = post_json(&*self.transport, &recipient.domain, INTEROP_PATH, &request).await?;
        if !resp.received {
            return Err(ServerError::Protocol(format!("{} refused the envelope", recipient.domain)));
        }
        info!(recipient = %recipient, envelope_id = %envelope.id, "envelope forwarded");
        Ok(())
    }
}

/// Inbound half: answers other servers about this server's users.
#[derive(Clone)]
pub struct InteropReceiver {
    directory: Directory,
    domain: String,
}

impl InteropReceiver {
    pub fn new(directory: Directory, domain: &str) -> Self {
        Self { directory, domain: domain.to_string() }
    }

    pub async fn handle(&self, request: InteropRequest) -> Result<Value, ServerError> {
        match request.method()? {
            InteropMethod::GetRecipient => {
                let req: InteropGetRecipient = serde_json::from_value(request.payload)?;
                Ok(serde_json::to_value(self.get_recipient(&req.username).await?)?)
            }
            InteropMethod::SendMessage => {
                let envelope: Envelope = serde_json::from_value(request.payload)?;
                Ok(serde_json::to_value(self.send_message(envelope).await?)?)
            }
        }
    }

    /// Bundle for a local user; consumes one one-time prekey when any are left.
    pub async fn get_recipient(&self, username: &str) -> Result<PreKeyBundle, ServerError> {
        validate::username(username)?;
        self.directory.bundle(username).await
    }

    pub async fn send_message(&self, envelope: Envelope) -> Result<Received, ServerError> {
        envelope.validate()?;
        let recipient = envelope.recipient_address()?;
        if !recipient.is_local_to(&self.domain) {
            return Err(ServerError::Protocol(format!(
                "{} is not served by {}",
                envelope.recipient, self.domain
            )));
        }
        // This server's own users send through `/api`, where the sender is checked.
        if envelope.sender_address()?.is_local_to(&self.domain) {
            return Err(ServerError::Protocol(format!(
                "{} is local to {} and cannot arrive over interop",
                envelope.sender, self.domain
            )));
        }
        self.directory.deliver(&recipient.username, &envelope).await?;
        info!(recipient = %recipient, sender = %envelope.sender, "federated envelope queued");
        Ok(Received { received: true })
    }
}
