//! Shared fixtures: in-process servers joined by a loopback transport.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use wm_client::{ClientConfig, MailClient};
use wm_crypto::kdf::KdfParams;
use wm_proto::{Transport, TransportError};
use wm_server::{open_store, Server, ServerConfig};
use wm_store::Database;

pub const PASSWORD: &str = "correct-horse";

/// Routes `host` to the matching in-process `Server`.
#[derive(Default)]
pub struct Loopback {
    servers: RwLock<HashMap<String, Server>>,
}

impl Loopback {
    pub fn add(&self, server: Server) {
        self.servers.write().insert(server.config().domain.clone(), server);
    }
}

#[async_trait]
impl Transport for Loopback {
    async fn post(&self, host: &str, path: &str, body: Value) -> Result<Value, TransportError> {
        let server = self
            .servers
            .read()
            .get(host)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(host.to_string()))?;
        server
            .handle(path, body)
            .await
            .map_err(|e| TransportError::Status { host: host.to_string(), status: e.status_code() })
    }
}

pub struct Network {
    pub dir: TempDir,
    pub loopback: Arc<Loopback>,
}

impl Network {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap(), loopback: Arc::new(Loopback::default()) }
    }

    pub async fn server(&self, domain: &str) -> Server {
        self.server_with(ServerConfig { domain: domain.to_string(), ..ServerConfig::default() })
            .await
    }

    pub async fn server_with(&self, config: ServerConfig) -> Server {
        let db = Database::open(&self.dir.path().join(format!("{}.db", config.domain)));
        let store = open_store(db, "server-admin-password", KdfParams::light(), &config.domain)
            .await
            .unwrap();
        let server = Server::new(config, store, self.loopback.clone());
        self.loopback.add(server.clone());
        server
    }

    /// A client with its own data directory; no account yet.
    pub fn client(&self, label: &str) -> MailClient {
        self.client_over(label, self.loopback.clone())
    }

    /// As `client`, talking through `transport` instead of the loopback.
    pub fn client_over(&self, label: &str, transport: Arc<dyn Transport>) -> MailClient {
        let data_dir = self.dir.path().join(label);
        std::fs::create_dir_all(&data_dir).unwrap();
        let config = ClientConfig { data_dir, kdf: KdfParams::light(), ..ClientConfig::default() };
        MailClient::with_transport(config, transport)
    }

    /// A client with a registered, logged-in account.
    pub async fn user(&self, username: &str, domain: &str) -> MailClient {
        let client = self.client(&format!("{username}@{domain}"));
        client.create_user(domain, username, username, PASSWORD).await.unwrap();
        client
    }
}

pub fn contact(email: &str) -> wm_proto::Contact {
    let name = email.split('@').next().unwrap_or(email).to_string();
    wm_proto::Contact { name, email: email.to_string() }
}
