//! Configuration loading for relay-client.
//!
//! Configuration is loaded from a TOML file (the CLI uses
//! `<data_dir>/config.toml`). Every field has a default, so an empty or
//! missing file yields a working configuration.

use relay_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::ConnectOptions;
use crate::signer::RemoteOptions;

/// Root configuration for relay-client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relays to publish to and query (default: three public relays).
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,
    /// Bound on each connection attempt in milliseconds (default: 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Wait for a relay's OK in milliseconds (default: 5000).
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Wait for a relay's EOSE in milliseconds (default: 5000).
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,
    /// Drop queried events that fail id/signature checks (default: true).
    #[serde(default = "default_verify_events")]
    pub verify_events: bool,
    /// Connection retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Remote signer configuration.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Connection retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per relay, first included (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on any single delay in milliseconds (default: 8000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Remote signer (NIP-46) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// How long to wait for the user to approve a connection (default: 120).
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Bound on each request after connecting (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Permissions asked for on connect (default: the kinds Tunecast signs).
    #[serde(default = "default_perms")]
    pub perms: String,
    /// Name shown to the user by the signer (default: "Tunecast").
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

// Default value functions
fn default_relays() -> Vec<String> {
    vec![
        "wss://relay.damus.io".to_string(),
        "wss://nos.lol".to_string(),
        "wss://relay.primal.net".to_string(),
    ]
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_collect_timeout_ms() -> u64 {
    5_000
}

fn default_verify_events() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_approval_timeout_secs() -> u64 {
    120
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_perms() -> String {
    "sign_event:0,sign_event:1,sign_event:5,sign_event:1063,sign_event:30078".to_string()
}

fn default_app_name() -> String {
    "Tunecast".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: default_approval_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            perms: default_perms(),
            app_name: default_app_name(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            collect_timeout_ms: default_collect_timeout_ms(),
            verify_events: default_verify_events(),
            retry: RetryConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Self::from_toml_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        let write = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content.as_bytes())
        };
        write(path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Retry policy for socket establishment.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    /// Connection options for publishers and collectors.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    /// Wait for a relay's OK.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Wait for a relay's EOSE.
    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// Options for remote signer handshakes and requests.
    pub fn remote_options(&self) -> RemoteOptions {
        RemoteOptions {
            approval_timeout: Duration::from_secs(self.remote.approval_timeout_secs),
            request_timeout: Duration::from_secs(self.remote.request_timeout_secs),
            perms: Some(self.remote.perms.clone()).filter(|p| !p.is_empty()),
            app_name: Some(self.remote.app_name.clone()).filter(|n| !n.is_empty()),
            connect: self.connect_options(),
            auth_handler: None,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to render configuration.
    #[error("failed to serialize config: {0}")]
    SerializeError(toml::ser::Error),
    /// Failed to write configuration file.
    #[error("failed to write config file {path}: {source}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.relays.len(), 3);
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert!(config.verify_events);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.remote.approval_timeout_secs, 120);
        assert_eq!(config.remote.request_timeout_secs, 30);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
            relays = ["wss://relay.one", "wss://relay.two"]
            ack_timeout_ms = 2500
            verify_events = false

            [retry]
            max_attempts = 5

            [remote]
            approval_timeout_secs = 60
            app_name = "Tunecast Studio"
        "#;

        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.relays, vec!["wss://relay.one", "wss://relay.two"]);
        assert_eq!(config.ack_timeout(), Duration::from_millis(2500));
        assert!(!config.verify_events);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.remote.approval_timeout_secs, 60);
        assert_eq!(config.remote.request_timeout_secs, 30);
        assert_eq!(config.remote.app_name, "Tunecast Studio");
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(ClientConfig::from_toml_str("relays = 7").is_err());
    }

    #[test]
    fn derived_options_follow_config() {
        let mut config = ClientConfig::default();
        config.connect_timeout_ms = 750;
        config.retry.max_attempts = 4;
        config.retry.base_delay_ms = 200;
        config.retry.max_delay_ms = 1_000;

        let opts = config.connect_options();
        assert_eq!(opts.connect_timeout, Duration::from_millis(750));
        assert_eq!(opts.retry.attempts(), 4);
        assert_eq!(opts.retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(opts.retry.delay_for(4), Duration::from_millis(1_000));

        let remote = config.remote_options();
        assert_eq!(remote.approval_timeout, Duration::from_secs(120));
        assert_eq!(remote.app_name.as_deref(), Some("Tunecast"));
    }

    #[test]
    fn empty_perms_are_not_requested() {
        let mut config = ClientConfig::default();
        config.remote.perms.clear();
        assert!(config.remote_options().perms.is_none());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = ClientConfig::default();
        config.relays = vec!["ws://127.0.0.1:7777".to_string()];
        config.save(&path).unwrap();

        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn unreadable_toml_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "connect_timeout_ms = \"soon\"").unwrap();

        let err = ClientConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
