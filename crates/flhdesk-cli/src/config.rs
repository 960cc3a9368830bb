//! TOML-based configuration for the CLI.
//!
//! Reads and writes [`CliConfig`] at the platform-appropriate location:
//! - Linux:    `~/.config/flhdesk/config.toml`
//! - macOS:    `~/Library/Application Support/flhdesk/config.toml`
//! - Windows:  `%APPDATA%\flhdesk\config.toml`
//!
//! Every field carries a serde default so a partial (or absent) file works:
//! first run needs no config at all, and files written by older versions keep
//! loading after new fields are added.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Persistent CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CliConfig {
    /// Bluetooth address of the desk, e.g. `"E7:8A:12:0D:5F:31"`.
    /// The `--address` flag takes precedence when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Movement sensitivity level (0–8) sent with every command.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u8,

    /// Reconnection attempts per outage.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnection attempts, in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            address: None,
            sensitivity: default_sensitivity(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            log_level: default_log_level(),
        }
    }
}

fn default_sensitivity() -> u8 {
    0
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform-appropriate path of the config file.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("flhdesk").join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`; a missing file yields the defaults.
pub fn load(path: &Path) -> Result<CliConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(toml::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CliConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes the config to `path`, creating parent directories as needed.
pub fn save(config: &CliConfig, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(io_err)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_all_defaults() {
        let cfg: CliConfig = toml::from_str("").expect("empty config must parse");
        assert_eq!(cfg, CliConfig::default());
        assert_eq!(cfg.sensitivity, 0);
        assert_eq!(cfg.reconnect_attempts, 10);
        assert_eq!(cfg.reconnect_delay_secs, 5);
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.address.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults_for_missing_fields() {
        let cfg: CliConfig = toml::from_str(
            r#"
            address = "E7:8A:12:0D:5F:31"
            sensitivity = 4
            "#,
        )
        .expect("partial config must parse");

        assert_eq!(cfg.address.as_deref(), Some("E7:8A:12:0D:5F:31"));
        assert_eq!(cfg.sensitivity, 4);
        assert_eq!(cfg.reconnect_attempts, 10, "missing field gets default");
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join("flhdesk-test-does-not-exist.toml");
        let cfg = load(&path).expect("missing file is not an error");
        assert_eq!(cfg, CliConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let path = std::env::temp_dir()
            .join(format!("flhdesk-test-{}", std::process::id()))
            .join("config.toml");

        let config = CliConfig {
            address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            sensitivity: 6,
            reconnect_attempts: 3,
            reconnect_delay_secs: 2,
            log_level: "debug".to_string(),
        };

        save(&config, &path).expect("save");
        let loaded = load(&path).expect("load");
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
