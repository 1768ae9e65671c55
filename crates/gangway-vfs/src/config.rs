//! Configuration for the virtual filesystem core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Filesystem core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SSH handshake and session-acquisition timeout in seconds
    #[serde(default = "default_ssh_timeout")]
    pub ssh_timeout_secs: u64,

    /// Include dotfiles in directory listings
    #[serde(default)]
    pub show_hidden: bool,

    /// Share one underlying SSH client across SFTP sessions to the same
    /// (user, asset, credential)
    #[serde(default = "default_reuse")]
    pub reuse_connection: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ssh_timeout_secs: default_ssh_timeout(),
            show_hidden: false,
            reuse_connection: default_reuse(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ssh_timeout_secs == 0 {
            return Err(Error::Config(
                "ssh_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }
}

/// Logging configuration
///
/// NIST 800-53: AU-2 (Audit Events), AU-12 (Audit Generation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (text or json)
    pub format: LogFormat,
    /// Optional log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            file: None,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text logging for human readability
    Text,
    /// JSON structured logging for SIEM integration
    Json,
}

/// Install the global tracing subscriber described by `config`.
///
/// Fails if a subscriber is already installed or the level filter does not
/// parse.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("invalid log level {:?}: {}", config.level, e)))?;

    let installed = match (&config.file, config.format) {
        (Some(path), format) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Config(format!("cannot open log file: {}", e)))?;
            let writer = Mutex::new(file);
            match format {
                LogFormat::Json => tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .json()
                    .try_init(),
                LogFormat::Text => tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .try_init(),
            }
        }
        (None, LogFormat::Json) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .try_init(),
        (None, LogFormat::Text) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    installed.map_err(|e| Error::Config(format!("failed to install logger: {}", e)))
}

fn default_ssh_timeout() -> u64 {
    15
}

fn default_reuse() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.ssh_timeout_secs, 15);
        assert!(!config.show_hidden);
        assert!(config.reuse_connection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = Config {
            ssh_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            show_hidden = true

            [logging]
            level = "debug"
            format = "text"
            "#,
        )
        .unwrap();
        assert!(config.show_hidden);
        assert_eq!(config.ssh_timeout_secs, 15);
        assert_eq!(config.logging.format, LogFormat::Text);
    }
}
