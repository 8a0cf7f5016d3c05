//! `Server` — transport-agnostic entry points for the three routes.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use wm_proto::{
    api::{ApiRequest, RegisterRequest, Success},
    interop::InteropRequest,
    Transport, API_PATH, INTEROP_PATH, REGISTER_PATH,
};
use wm_crypto::kdf::KdfParams;
use wm_store::{Authentication, Database, EncryptedStore, NewLogin};

use crate::{
    challenge::ChallengeHandler,
    config::ServerConfig,
    directory::Directory,
    error::ServerError,
    interop::{InteropReceiver, InteropSender},
};

/// Login scope of the server's own admin record; `#` keeps it apart from
/// every valid username.
pub const ADMIN_SCOPE: &str = "#server";

/// Unlock the server database with the admin password, creating the
/// admin record on first start.
pub async fn open_store(db: Database, password: &str, kdf: KdfParams, domain: &str) -> Result<EncryptedStore, ServerError> {
    let auth = Authentication::with_scope(db.clone(), ADMIN_SCOPE, kdf);
    if auth.has_login_info().await? {
        auth.login(password)
            .await
            .map_err(|e| ServerError::Authentication(e.to_string()))?;
    } else {
        auth.create_login_info(
            password,
            NewLogin {
                server_address: domain.to_string(),
                username: ADMIN_SCOPE.to_string(),
                name: domain.to_string(),
            },
        )
        .await?;
        info!(%domain, "server database initialised");
    }
    Ok(EncryptedStore::new(db, auth))
}

/// State shared by every handler.
pub struct Context {
    pub config: ServerConfig,
    pub directory: Directory,
    pub interop: InteropSender,
}

#[derive(Clone)]
pub struct Server {
    ctx: Arc<Context>,
    challenges: ChallengeHandler,
    interop: InteropReceiver,
}

impl Server {
    /// `store` must belong to an already logged-in `Authentication`.
    pub fn new(config: ServerConfig, store: EncryptedStore, transport: Arc<dyn Transport>) -> Self {
        let directory = Directory::new(store);
        let interop = InteropReceiver::new(directory.clone(), &config.domain);
        let ctx = Arc::new(Context {
            config,
            directory,
            interop: InteropSender::new(transport),
        });
        Self {
            challenges: ChallengeHandler::new(ctx.clone()),
            interop,
            ctx,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    pub fn directory(&self) -> &Directory {
        &self.ctx.directory
    }

    pub fn challenges(&self) -> &ChallengeHandler {
        &self.challenges
    }

    pub async fn handle_register(&self, request: RegisterRequest) -> Result<Success, ServerError> {
        request.validate()?;
        self.ctx.directory.register(request.into()).await?;
        Ok(Success::OK)
    }

    pub async fn handle_api(&self, request: ApiRequest) -> Result<Value, ServerError> {
        self.challenges.handle(request).await
    }

    pub async fn handle_interop(&self, request: InteropRequest) -> Result<Value, ServerError> {
        self.interop.handle(request).await
    }

    /// Route a raw JSON body by path.
    pub async fn handle(&self, path: &str, body: Value) -> Result<Value, ServerError> {
        let result = self.route(path, body).await;
        if let Err(e) = &result {
            warn!(path, error = %e, status = e.status_code(), "request refused");
        }
        result
    }

    async fn route(&self, path: &str, body: Value) -> Result<Value, ServerError> {
        match path {
            REGISTER_PATH => {
                let ok = self.handle_register(serde_json::from_value(body)?).await?;
                Ok(serde_json::to_value(ok)?)
            }
            API_PATH => self.handle_api(serde_json::from_value(body)?).await,
            INTEROP_PATH => self.handle_interop(serde_json::from_value(body)?).await,
            other => Err(ServerError::NotFound(format!("route {other}"))),
        }
    }

    pub fn log_startup(&self) {
        info!(domain = %self.ctx.config.domain, listen = %self.ctx.config.listen, "whispermail server ready");
    }
}
