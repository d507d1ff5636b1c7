//! Device discovery collaborator.
//!
//! Discovery answers one question: which devices are reachable right now?
//! The session does not care how the answer is produced, so it is modelled
//! as an async trait.  The network broadcast implementation lives outside
//! this crate; [`ConfiguredDiscovery`] serves the devices listed in the
//! client configuration.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

/// One discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Human-readable name.
    pub name: String,
    /// Address to pass to `RemoteClient::connect`.
    pub ip: String,
    /// Stable identifier reported by the device.
    pub identifier: String,
}

/// Errors raised during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery round did not finish within its time budget.
    #[error("discovery did not finish within {0:?}")]
    Timeout(Duration),

    /// The discovery mechanism itself failed.
    #[error("discovery failed: {0}")]
    Failed(String),
}

/// Produces candidate devices within a time budget.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// Returns every device found within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the mechanism fails outright.
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError>;
}

/// Runs `discovery` and enforces `timeout` even if the implementation ignores it.
///
/// # Errors
///
/// Returns [`DiscoveryError::Timeout`] if the round overruns, or whatever
/// the implementation returned.
pub async fn discover_within(
    discovery: &dyn DeviceDiscovery,
    timeout: Duration,
) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
    match time::timeout(timeout, discovery.discover(timeout)).await {
        Ok(Ok(devices)) => {
            debug!("discovery found {} device(s)", devices.len());
            Ok(devices)
        }
        Ok(Err(e)) => {
            warn!("{e}");
            Err(e)
        }
        Err(_) => Err(DiscoveryError::Timeout(timeout)),
    }
}

/// Discovery backed by a fixed list, typically the `devices` config entries.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDiscovery {
    devices: Vec<DiscoveredDevice>,
}

impl ConfiguredDiscovery {
    pub fn new(devices: Vec<DiscoveredDevice>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceDiscovery for ConfiguredDiscovery {
    async fn discover(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        Ok(self.devices.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
