use crate::constants::{
    DEFAULT_INTAKE_INTERVAL_SECS, DEFAULT_MAX_CONCURRENT_BATCHES, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_REARM_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "ecr-sync.toml";

/// Runtime settings: the optional TOML file first, environment on top.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index service base URL (`PACER_INDEX_SERVICE`).
    pub index_service_url: Option<String>,
    /// Bulk intake directory (`LOCAL_BULKDATA_PATH`); `none` disables intake.
    pub bulk_data_path: Option<String>,
    /// Intake runs only when this is set (`LOCAL_PACER_URL`).
    pub local_pacer_url: Option<String>,
    /// Skip TLS verification on job submissions (`TRUST_CERT`).
    pub trust_cert: bool,
    pub poll_interval_secs: u64,
    pub intake_interval_secs: u64,
    pub rearm_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_concurrent_batches: usize,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_service_url: None,
            bulk_data_path: None,
            local_pacer_url: None,
            trust_cert: false,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            intake_interval_secs: DEFAULT_INTAKE_INTERVAL_SECS,
            rearm_interval_secs: DEFAULT_REARM_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Loads `path` (or `ecr-sync.toml` when present), then applies `.env`
    /// and process environment overrides. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        dotenv::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlays the recognised environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PACER_INDEX_SERVICE") {
            self.index_service_url = Some(url);
        }
        if let Some(path) = lookup("LOCAL_BULKDATA_PATH") {
            self.bulk_data_path = Some(path);
        }
        if let Some(url) = lookup("LOCAL_PACER_URL") {
            self.local_pacer_url = Some(url);
        }
        if let Some(flag) = lookup("TRUST_CERT") {
            self.trust_cert = flag.trim().eq_ignore_ascii_case("true");
        }
    }

    /// Index service base URL without a trailing `/`.
    pub fn index_service_url(&self) -> Result<String> {
        match self.index_service_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url.trim_end_matches('/').to_string()),
            _ => Err(SyncError::Config(
                "PACER_INDEX_SERVICE is not set".to_string(),
            )),
        }
    }

    /// Bulk intake directory, when intake is enabled.
    pub fn intake_dir(&self) -> Option<PathBuf> {
        let pacer_url = self.local_pacer_url.as_deref().map(str::trim).unwrap_or("");
        if pacer_url.is_empty() {
            return None;
        }
        match self.bulk_data_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() && !path.eq_ignore_ascii_case("none") => {
                Some(PathBuf::from(path))
            }
            _ => None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn intake_interval(&self) -> Duration {
        Duration::from_secs(self.intake_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rearm_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rearm_interval_secs as i64)
    }
}
