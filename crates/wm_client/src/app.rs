//! MailClient — one local account, wired in dependency order.
//!
//! `Database` → `Authentication` → `EncryptedStore` → `SessionStore` →
//! `RequestSender` / session engine → `MessageHandler`.

use std::sync::Arc;
use tracing::{error, info, warn};

use wm_crypto::{SessionEngine, X3dhEngine};
use wm_proto::{api::RegisterRequest, validate, Address, HttpTransport, Transport};
use wm_store::{Authentication, Database, EncryptedStore, LoginInfo, NewLogin, SessionStore};

use crate::{
    config::ClientConfig,
    error::ClientError,
    handler::MessageHandler,
    sender::RequestSender,
};

pub struct MailClient {
    config: ClientConfig,
    db: Database,
    auth: Authentication,
    store: EncryptedStore,
    sessions: SessionStore,
    engine: Arc<dyn SessionEngine>,
    transport: Arc<dyn Transport>,
}

impl MailClient {
    /// Client over HTTP with the configured timeouts.
    pub fn open(config: ClientConfig) -> Result<Self, ClientError> {
        config.ensure_data_dir()?;
        let transport = HttpTransport::with_timeouts(config.connect_timeout(), config.request_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let db = Database::open(&config.database_path());
        let auth = Authentication::new(db.clone(), config.kdf);
        let store = EncryptedStore::new(db.clone(), auth.clone());
        let sessions = SessionStore::new(store.clone());
        let engine: Arc<dyn SessionEngine> = Arc::new(X3dhEngine::new(Arc::new(sessions.clone())));
        Self { config, db, auth, store, sessions, engine, transport }
    }

    /// Swap in another session engine (before any messaging).
    pub fn set_engine(&mut self, engine: Arc<dyn SessionEngine>) {
        self.engine = engine;
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn has_user(&self) -> Result<bool, ClientError> {
        Ok(self.auth.has_login_info().await?)
    }

    pub async fn authenticated(&self) -> bool {
        self.auth.authenticated().await
    }

    pub async fn login_info(&self) -> Result<LoginInfo, ClientError> {
        self.auth
            .login_info()
            .await?
            .ok_or_else(|| ClientError::NotFound("login info".into()))
    }

    /// Create the local account, register it with `server_address` and
    /// publish the first keys. Any failure after the login record exists
    /// rolls the local account back, and a registration the server already
    /// accepted is withdrawn, so signup can be retried.
    pub async fn create_user(
        &self,
        server_address: &str,
        username: &str,
        name: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        validate::username(username)?;
        validate::non_empty("name", name)?;
        validate::non_empty("serverAddress", server_address)?;
        Address::new(username, server_address).to_string().parse::<Address>()?;

        self.auth
            .create_login_info(
                password,
                NewLogin {
                    server_address: server_address.to_string(),
                    username: username.to_string(),
                    name: name.to_string(),
                },
            )
            .await?;

        match self.provision(server_address, username, name).await {
            Ok(()) => {
                info!(username, server = server_address, "account created");
                Ok(())
            }
            Err((err, registered)) => {
                error!(username, error = %err, "account creation failed; rolling back");
                if registered {
                    let sender = RequestSender::new(self.transport.clone(), server_address, username, self.sessions.clone());
                    if let Err(cleanup) = sender.deregister().await {
                        warn!(username, error = %cleanup, "server registration left behind");
                    }
                }
                if let Err(cleanup) = self.wipe_local().await {
                    warn!(error = %cleanup, "rollback incomplete");
                }
                Err(err)
            }
        }
    }

    /// Keys, registration and the first key upload. The flag on error says
    /// whether the server already holds the registration.
    async fn provision(&self, server_address: &str, username: &str, name: &str) -> Result<(), (ClientError, bool)> {
        let keys = async {
            let identity = self.sessions.generate_identity_key_pair().await?;
            let registration_id = self.sessions.generate_local_registration_id().await?;
            let api_key = self.sessions.generate_api_key_pair().await?;
            Ok::<_, ClientError>(RegisterRequest {
                username: username.to_string(),
                name: name.to_string(),
                public_key: identity.public_b64(),
                registration_id,
                api_public_key: api_key.public_b64(),
            })
        };
        let request = keys.await.map_err(|e| (e, false))?;

        let sender = RequestSender::new(self.transport.clone(), server_address, username, self.sessions.clone());
        sender.register(&request).await.map_err(|e| (e, false))?;

        self.handler_for(server_address, username, name)
            .check()
            .await
            .map_err(|e| (e, true))?;
        Ok(())
    }

    pub async fn login(&self, password: &str) -> Result<(), ClientError> {
        self.auth.login(password).await?;
        Ok(())
    }

    pub async fn logout(&self) {
        self.auth.logout().await;
    }

    /// Handler for the logged-in account.
    pub async fn message_handler(&self) -> Result<MessageHandler, ClientError> {
        if !self.authenticated().await {
            return Err(ClientError::Authentication("log in first".into()));
        }
        let info = self.login_info().await?;
        Ok(self.handler_for(&info.server_address, &info.username, &info.name))
    }

    fn handler_for(&self, server_address: &str, username: &str, name: &str) -> MessageHandler {
        let sender = RequestSender::new(self.transport.clone(), server_address, username, self.sessions.clone());
        MessageHandler::new(
            self.store.clone(),
            self.sessions.clone(),
            self.engine.clone(),
            sender,
            Address::new(username, server_address),
            name,
            self.config.prekey_batch_size,
        )
    }

    /// Deregister from the server, then erase the local account.
    pub async fn delete_account(&self) -> Result<(), ClientError> {
        let info = self.login_info().await?;
        if !self.authenticated().await {
            return Err(ClientError::Authentication("log in first".into()));
        }
        RequestSender::new(self.transport.clone(), &info.server_address, &info.username, self.sessions.clone())
            .deregister()
            .await?;
        self.wipe_local().await?;
        info!(username = %info.username, "account deleted");
        Ok(())
    }

    async fn wipe_local(&self) -> Result<(), ClientError> {
        self.store.remove_scope().await?;
        self.db.remove_all_messages().await?;
        self.auth.destroy_login_info().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wm_crypto::kdf::KdfParams;
    use wm_proto::TransportError;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn post(&self, host: &str, _path: &str, _body: serde_json::Value) -> Result<serde_json::Value, TransportError> {
            Err(TransportError::Unreachable(host.to_string()))
        }
    }

    fn client(dir: &tempfile::TempDir) -> MailClient {
        let config = ClientConfig {
            data_dir: dir.path().to_path_buf(),
            kdf: KdfParams::light(),
            ..ClientConfig::default()
        };
        MailClient::with_transport(config, Arc::new(Unreachable))
    }

    #[tokio::test]
    async fn failed_registration_rolls_back_local_account() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir);

        let err = client.create_user("example.com", "alice", "Alice", "correct-horse").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(!client.has_user().await.unwrap());
        assert!(!client.authenticated().await);
    }

    #[tokio::test]
    async fn invalid_username_is_rejected_before_any_state() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir);
        assert!(matches!(
            client.create_user("example.com", "Not Valid", "Alice", "pw").await,
            Err(ClientError::Validation(_))
        ));
        assert!(!client.has_user().await.unwrap());
    }

    #[tokio::test]
    async fn message_handler_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir);
        assert!(matches!(client.message_handler().await, Err(ClientError::Authentication(_))));
    }
}
