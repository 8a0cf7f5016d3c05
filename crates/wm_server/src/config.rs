//! Server configuration: JSON file, then environment, then CLI flags.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Domain this server is home to; the part after `@` in its users' addresses.
    pub domain: String,
    pub listen: SocketAddr,
    pub database_path: PathBuf,
    /// How long an issued challenge stays redeemable.
    pub challenge_ttl_ms: u64,
    /// `check` reports prekeys as low below this count.
    pub prekey_low_threshold: u32,
    /// `check` reports the signed prekey as stale beyond this age.
    pub signed_prekey_max_age_secs: u64,
    pub interop_connect_timeout_secs: u64,
    pub interop_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain: "localhost:8080".into(),
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: PathBuf::from("whispermail-server.db"),
            challenge_ttl_ms: 5_000,
            prekey_low_threshold: 10,
            signed_prekey_max_age_secs: 7 * 24 * 60 * 60,
            interop_connect_timeout_secs: 10,
            interop_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_millis(self.challenge_ttl_ms)
    }

    pub fn signed_prekey_max_age(&self) -> chrono::Duration {
        chrono::Duration::from_std(Duration::from_secs(self.signed_prekey_max_age_secs))
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"domain":"example.com","challenge_ttl_ms":250}"#).unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.domain, "example.com");
        assert_eq!(cfg.challenge_ttl(), Duration::from_millis(250));
        assert_eq!(cfg.prekey_low_threshold, 10);
    }
}
