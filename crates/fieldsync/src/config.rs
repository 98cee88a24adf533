//! Engine configuration
//!
//! Defaults, then an optional YAML file, then `FIELDSYNC_*` environment
//! overrides.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "FIELDSYNC_CONFIG";
pub const REMOTE_URL_ENV: &str = "FIELDSYNC_REMOTE_URL";
pub const DATABASE_PATH_ENV: &str = "FIELDSYNC_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote authority (`/assets` and `/sync` live under it)
    pub remote_url: String,
    pub database_path: PathBuf,
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Push right after a capture when already online
    pub push_on_capture: bool,
    /// Write logs here instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: "http://127.0.0.1:5000/api".to_string(),
            database_path: PathBuf::from("fieldsync.db"),
            probe_interval_ms: 5_000,
            probe_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
            push_on_capture: true,
            log_file: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;
        Self::from_yaml_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML {}: {}", path.display(), e))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the effective configuration for this process
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let config = match explicit_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(REMOTE_URL_ENV) {
            self.remote_url = url;
        }
        if let Some(path) = lookup(DATABASE_PATH_ENV) {
            self.database_path = PathBuf::from(path);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_url.trim().is_empty() {
            bail!("remote_url must not be empty");
        }
        if self.probe_timeout_ms == 0 {
            bail!("probe_timeout_ms must be greater than zero");
        }
        if self.probe_timeout_ms >= self.probe_interval_ms {
            bail!(
                "probe_timeout_ms ({}) must be shorter than probe_interval_ms ({})",
                self.probe_timeout_ms,
                self.probe_interval_ms
            );
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
