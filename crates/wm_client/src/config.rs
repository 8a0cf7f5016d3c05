//! Client configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use wm_crypto::kdf::KdfParams;

use crate::error::ClientError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "whispermail";
pub const APP_NAME: &str = "client";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub data_dir: PathBuf,
    pub kdf: KdfParams,
    /// One-time prekeys uploaded whenever the server reports it is low.
    pub prekey_batch_size: u32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            kdf: KdfParams::default(),
            prekey_batch_size: 10,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Defaults, with `WM_DATA_DIR` overriding the data directory.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("WM_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("whispermail.db")
    }

    pub fn ensure_data_dir(&self) -> Result<(), ClientError> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| ClientError::Config(format!("cannot create {}: {e}", self.data_dir.display())))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".whispermail"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ClientConfig = serde_json::from_str(r#"{"data_dir":"/tmp/wm","prekey_batch_size":3}"#).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/wm"));
        assert_eq!(cfg.prekey_batch_size, 3);
        assert_eq!(cfg.kdf, KdfParams::default());
        assert_eq!(cfg.database_path(), PathBuf::from("/tmp/wm/whispermail.db"));
    }
}
