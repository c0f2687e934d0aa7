use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::deid::coordinator::DEFAULT_MAX_FINISHED;
use crate::deid::poller::PollPolicy;
use crate::healthcare::models::Dataset;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_HEALTHCARE_ENDPOINT: &str = "https://healthcare.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Mandatory setting {key} not found (set it in the config file or via {env})")]
    Missing { key: &'static str, env: &'static str },

    #[error("Invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcpConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub dataset_id: String,
    /// Path to the service account JSON key used for API calls and URL signing
    #[serde(default)]
    pub service_account: String,
    #[serde(default = "default_healthcare_endpoint")]
    pub healthcare_endpoint: String,
    /// Upper bound on any single Google API request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    pub domain: Option<String>,
    pub debug_port: Option<u16>,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    pub max_attempts: Option<u32>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Finished jobs kept for status queries; the oldest are evicted first
    #[serde(default = "default_max_finished")]
    pub max_finished: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub path: String,
    /// Maximum size of a single log file in megabytes
    #[serde(default = "default_log_size")]
    pub size: u64,
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

fn default_healthcare_endpoint() -> String {
    DEFAULT_HEALTHCARE_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_finished() -> usize {
    DEFAULT_MAX_FINISHED
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    1000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5000".to_string()]
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_seconds() -> Option<u64> {
    Some(6 * 60 * 60)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_size() -> u64 {
    10
}

fn default_log_max_files() -> usize {
    5
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: String::new(),
            dataset_id: String::new(),
            service_account: String::new(),
            healthcare_endpoint: default_healthcare_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            domain: None,
            debug_port: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_finished: default_max_finished(),
        }
    }
}

impl GcpConfig {
    /// The dataset every store operation is scoped to
    pub fn dataset(&self) -> Dataset {
        Dataset::new(&self.project_id, &self.location, &self.dataset_id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl HttpConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
            timeout: self.timeout_seconds.map(Duration::from_secs),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay values from the environment-style lookup. Empty values count as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("GCLOUD_PROJECT_ID") {
            self.gcp.project_id = v;
        }
        if let Some(v) = get("GCLOUD_PROJECT_LOCATION") {
            self.gcp.location = v;
        }
        if let Some(v) = get("GCLOUD_PROJECT_DATASET_ID") {
            self.gcp.dataset_id = v;
        }
        if let Some(v) = get("SERVICE_ACCOUNT") {
            self.gcp.service_account = v;
        }
        if let Some(v) = get("STORAGE_BUCKET_NAME") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("HTTP_ADDR") {
            self.http.addr = v;
        }
        if let Some(v) = get("HTTP_DOMAIN") {
            self.http.domain = Some(v);
        }
        if let Some(v) = get("PORT") {
            let port = v.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "http.debug_port",
                message: format!("{}: {}", v, e),
            })?;
            self.http.debug_port = Some(port);
        }
        Ok(())
    }

    /// Every required value must be present before anything talks to the cloud
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("gcp.project_id", "GCLOUD_PROJECT_ID", &self.gcp.project_id),
            ("gcp.location", "GCLOUD_PROJECT_LOCATION", &self.gcp.location),
            ("gcp.dataset_id", "GCLOUD_PROJECT_DATASET_ID", &self.gcp.dataset_id),
            ("gcp.service_account", "SERVICE_ACCOUNT", &self.gcp.service_account),
            ("storage.bucket", "STORAGE_BUCKET_NAME", &self.storage.bucket),
            ("http.addr", "HTTP_ADDR", &self.http.addr),
        ];
        for (key, env, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { key, env });
            }
        }

        if self.http.debug_port.is_none() {
            return Err(ConfigError::Missing {
                key: "http.debug_port",
                env: "PORT",
            });
        }

        if self.gcp.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "gcp.request_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "polling.interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Load the config file, overlay the process environment and validate.
///
/// A missing file is tolerated so that deployments can rely on the
/// environment alone; the required values are still enforced.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut config = if Path::new(path).exists() {
        let config_text =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_string(), e))?;
        Config::from_toml_str(&config_text)?
    } else {
        warn!("Config file {} not found, using environment only", path);
        Config::default()
    };

    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}
