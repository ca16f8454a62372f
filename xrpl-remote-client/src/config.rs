//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via XRPL_REMOTE_CONFIG)
//! 3. Environment variables

use crate::connection::{
    ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIVENESS_WINDOW, DEFAULT_OUTGOING_CAPACITY,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_STREAM_CAPACITY, DEFAULT_WRITE_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use xrpl_remote_protocol::{StreamCategory, DEFAULT_ENDPOINT};

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection to the server.
    pub remote: RemoteConfig,
    /// Streams to follow once connected.
    pub subscribe: SubscribeConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("XRPL_REMOTE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.remote.apply_overrides(&var);
        self.subscribe.apply_overrides(&var);
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Builds the connection settings described by this configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        let remote = &self.remote;
        let mut config = ConnectionConfig::new(remote.endpoint.clone())
            .with_connect_timeout(remote.connect_timeout())
            .with_write_timeout(remote.write_timeout())
            .with_liveness_window(remote.liveness_window())
            .with_outgoing_capacity(remote.outgoing_capacity)
            .with_stream_capacity(remote.stream_capacity);

        // Without an explicit interval, the one derived from the window stands.
        if let Some(interval) = remote.ping_interval() {
            config = config.with_ping_interval(interval);
        }
        config = match remote.request_timeout() {
            Some(timeout) => config.with_request_timeout(timeout),
            None => config.without_request_timeout(),
        };
        config
    }
}

/// Server connection settings. Durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// WebSocket URL, `ws://` only.
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// Keepalive period; derived from the liveness window when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_secs: Option<u64>,
    pub liveness_window_secs: u64,
    /// Per-command wait (0 = wait indefinitely).
    pub request_timeout_secs: u64,
    pub outgoing_capacity: usize,
    pub stream_capacity: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            ping_interval_secs: None,
            liveness_window_secs: DEFAULT_LIVENESS_WINDOW.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

impl RemoteConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = var("XRPL_REMOTE_ENDPOINT") {
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }

        let secs = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(n) = secs("XRPL_REMOTE_CONNECT_TIMEOUT") {
            self.connect_timeout_secs = n;
        }
        if let Some(n) = secs("XRPL_REMOTE_WRITE_TIMEOUT") {
            self.write_timeout_secs = n;
        }
        if let Some(n) = secs("XRPL_REMOTE_PING_INTERVAL") {
            self.ping_interval_secs = Some(n);
        }
        if let Some(n) = secs("XRPL_REMOTE_LIVENESS_WINDOW") {
            self.liveness_window_secs = n;
        }
        if let Some(n) = secs("XRPL_REMOTE_REQUEST_TIMEOUT") {
            self.request_timeout_secs = n;
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Returns the configured keepalive period, if one was set.
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_secs.map(Duration::from_secs)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    /// Returns the per-command wait, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Streams and accounts to subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeConfig {
    pub streams: Vec<StreamCategory>,
    pub accounts: Vec<String>,
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            streams: vec![StreamCategory::Ledger],
            accounts: Vec::new(),
        }
    }
}

impl SubscribeConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(list) = var("XRPL_REMOTE_STREAMS") {
            let streams: Vec<StreamCategory> = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| match s.parse() {
                    Ok(category) => Some(category),
                    Err(e) => {
                        tracing::warn!("XRPL_REMOTE_STREAMS: ignoring entry: {}", e);
                        None
                    }
                })
                .collect();
            self.streams = streams;
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
