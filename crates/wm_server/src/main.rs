use anyhow::{anyhow, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wm_crypto::kdf::KdfParams;
use wm_proto::HttpTransport;
use wm_server::{http, open_store, Server, ServerConfig};
use wm_store::Database;

#[derive(Parser, Debug)]
#[command(author, version, about = "WhisperMail home server", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, env = "WM_SERVER_CONFIG")]
    config: Option<PathBuf>,
    /// Domain served, e.g. `example.com` or `127.0.0.1:8080`
    #[arg(long, env = "WM_SERVER_DOMAIN")]
    domain: Option<String>,
    #[arg(long, env = "WM_SERVER_LISTEN")]
    listen: Option<SocketAddr>,
    #[arg(long, env = "WM_SERVER_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(domain) = cli.domain {
        config.domain = domain;
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    let password = admin_password()?;
    let db = Database::open(&config.database_path);
    let store = open_store(db, &password, KdfParams::default(), &config.domain).await?;

    let transport = HttpTransport::with_timeouts(
        Duration::from_secs(config.interop_connect_timeout_secs),
        Duration::from_secs(config.interop_timeout_secs),
    )?;
    let listen = config.listen;
    let server = Server::new(config, store, Arc::new(transport));
    server.log_startup();

    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, http::router(server))
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;
    info!("server stopped");
    Ok(())
}

fn admin_password() -> Result<String> {
    if let Ok(pw) = std::env::var("WM_SERVER_PASSWORD") {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    let pw = rpassword::prompt_password("Server database password: ")
        .map_err(|e| anyhow!("password prompt: {e}"))?;
    if pw.len() < 12 {
        return Err(anyhow!("password too short; minimum 12 characters"));
    }
    Ok(pw)
}
