use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::service::Identity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Http,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_commit_wait_secs")]
    pub commit_wait_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default)]
    pub backend_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Session token of the signed-in user for the HTTP backend.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_upload_bucket")]
    pub upload_bucket: String,
    #[serde(default = "default_upload_max_bytes")]
    pub upload_max_bytes: u64,
    #[serde(default = "default_upload_max_attempts")]
    pub upload_max_attempts: u32,
}

fn default_debounce_ms() -> u64 {
    1000
}
fn default_commit_wait_secs() -> u64 {
    5
}
fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sortquest")
        .to_string_lossy()
        .to_string()
}
fn default_backend() -> BackendKind {
    BackendKind::Local
}
fn default_upload_bucket() -> String {
    "attachments".to_string()
}
fn default_upload_max_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_upload_max_attempts() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: None,
            email: None,
            debounce_ms: default_debounce_ms(),
            commit_wait_secs: default_commit_wait_secs(),
            data_dir: default_data_dir(),
            backend: default_backend(),
            backend_url: String::new(),
            api_key: String::new(),
            access_token: None,
            upload_bucket: default_upload_bucket(),
            upload_max_bytes: default_upload_max_bytes(),
            upload_max_attempts: default_upload_max_attempts(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.validate();
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sortquest")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn commit_wait(&self) -> Duration {
        Duration::from_secs(self.commit_wait_secs)
    }

    /// The signed-in identity, if both a user id is configured and non-empty.
    pub fn identity(&self) -> Option<Identity> {
        let user_id = self.user_id.as_deref()?.trim();
        if user_id.is_empty() {
            return None;
        }
        Some(Identity {
            user_id: user_id.to_string(),
            email: self.email.clone().unwrap_or_default(),
        })
    }

    /// Clamp values loaded from an edited config file into usable ranges.
    pub fn validate(&mut self) {
        self.debounce_ms = self.debounce_ms.clamp(100, 60_000);
        self.commit_wait_secs = self.commit_wait_secs.clamp(1, 60);
        self.upload_max_attempts = self.upload_max_attempts.clamp(1, 10);
        if self.upload_max_bytes == 0 {
            self.upload_max_bytes = default_upload_max_bytes();
        }
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.access_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.access_token = None;
        }
        if self.upload_bucket.trim().is_empty() {
            self.upload_bucket = default_upload_bucket();
        }
        // The HTTP backend is unusable without an endpoint.
        if self.backend == BackendKind::Http && self.backend_url.trim().is_empty() {
            self.backend = BackendKind::Local;
        }
    }
}
