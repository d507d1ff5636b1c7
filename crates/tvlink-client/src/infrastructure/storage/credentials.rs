//! Credential store collaborator.
//!
//! The session persists exactly one record, `{deviceAddress, credential}`,
//! after a successful pairing and reads it back before the next handshake.
//! The record is opaque JSON: the store never interprets the credential.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};
use tvlink_core::DeviceCredential;

use super::config::{config_dir, ConfigError};

/// File name of the credential record inside the config directory.
pub const CREDENTIAL_FILE_NAME: &str = "credentials.json";

/// Error type for credential persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing credentials at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record could not be serialized.
    #[error("failed to serialize credential record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The default location could not be resolved.
    #[error(transparent)]
    Location(#[from] ConfigError),
}

/// Loads and saves the pairing credential.
///
/// `load` never fails: an unreadable or corrupt record simply means the
/// next handshake runs without a credential and the device prompts again.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Returns the stored record, if any.
    fn load(&self) -> Option<DeviceCredential>;

    /// Replaces the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record could not be written.
    fn save(&self, record: &DeviceCredential) -> Result<(), StoreError>;
}

// ── JSON file store ───────────────────────────────────────────────────────────

/// Stores the record as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `credentials.json` in the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Location`] if the directory cannot be resolved.
    pub fn at_default_location() -> Result<Self, StoreError> {
        Ok(Self::new(config_dir()?.join(CREDENTIAL_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for JsonFileStore {
    fn load(&self) -> Option<DeviceCredential> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no credential record at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("could not read credentials at {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str::<DeviceCredential>(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("ignoring corrupt credential record at {}: {e}", self.path.display());
                None
            }
        }
    }

    fn save(&self, record: &DeviceCredential) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("credential for {} saved", record.device_address);
        Ok(())
    }
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// Keeps the record in process memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<DeviceCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `record`.
    pub fn with_record(record: DeviceCredential) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Option<DeviceCredential> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, record: &DeviceCredential) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
