//! TOML-based configuration for the TvLink client.
//!
//! Reads and writes [`ClientConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\TvLink\config.toml`
//! - Linux:    `~/.config/tvlink/config.toml`
//! - macOS:    `~/Library/Application Support/TvLink/config.toml`
//!
//! Example file:
//!
//! ```toml
//! log_level = "debug"
//! pairing_timeout_ms = 60000
//!
//! [[endpoints]]
//! scheme = "wss"
//! port = 3001
//!
//! [[devices]]
//! name = "Living room"
//! ip = "192.168.1.40"
//! identifier = "lr-tv"
//! ```
//!
//! Every field has a serde default, so a missing file, an empty file, or a
//! file written by an older version all load without error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use tvlink_core::protocol::Manifest;
use tvlink_core::EndpointTemplate;

use crate::infrastructure::discovery::DiscoveredDevice;

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

// ── Config schema ─────────────────────────────────────────────────────────────

/// Client settings stored on disk.
///
/// Scalar fields come first so the TOML output keeps plain keys above the
/// `[manifest]` table and the `[[endpoints]]`/`[[devices]]` arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-endpoint budget for opening the transport.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long a command waits for its answer.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long the handshake waits, including on-device approval.
    #[serde(default = "default_pairing_timeout_ms")]
    pub pairing_timeout_ms: u64,
    /// Gap between the press and release frames of a click.
    #[serde(default = "default_click_release_delay_ms")]
    pub click_release_delay_ms: u64,
    /// Upper bound for a discovery round.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// Overrides the default `credentials.json` location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_file: Option<PathBuf>,
    /// Identity presented to the device during pairing.
    #[serde(default)]
    pub manifest: Manifest,
    /// Endpoint templates, most capable first.
    #[serde(default = "EndpointTemplate::defaults")]
    pub endpoints: Vec<EndpointTemplate>,
    /// Known devices served by the configuration-backed discovery.
    #[serde(default)]
    pub devices: Vec<DiscoveredDevice>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_pairing_timeout_ms() -> u64 {
    30_000
}
fn default_click_release_delay_ms() -> u64 {
    50
}
fn default_discovery_timeout_ms() -> u64 {
    3_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pairing_timeout_ms: default_pairing_timeout_ms(),
            click_release_delay_ms: default_click_release_delay_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            credential_file: None,
            manifest: Manifest::default(),
            endpoints: EndpointTemplate::defaults(),
            devices: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(self.pairing_timeout_ms)
    }

    pub fn click_release_delay(&self) -> Duration {
        Duration::from_millis(self.click_release_delay_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for TvLink files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location, creating it with defaults
/// on first run.
///
/// # Errors
///
/// See [`load_or_init_config`].
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_or_init_config(&config_file_path()?)
}

/// Loads the config at `path`; if there is none yet, writes the defaults
/// there so users have a file to edit.
///
/// A failed write is logged and the defaults are still returned.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_or_init_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    if path.exists() {
        return load_config_from(path);
    }
    let config = ClientConfig::default();
    match save_config_to(path, &config) {
        Ok(()) => info!("wrote default config to {}", path.display()),
        Err(e) => warn!("could not write default config: {e}"),
    }
    Ok(config)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `tvlink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("TvLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tvlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("TvLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
