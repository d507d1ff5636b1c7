//! Persisted pairing credential.

use serde::{Deserialize, Serialize};

/// Credential issued by a device after a successful handshake.
///
/// Serialized as the opaque store record
/// `{"deviceAddress": "...", "credential": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredential {
    pub device_address: String,
    pub credential: String,
}

impl DeviceCredential {
    pub fn new(device_address: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            device_address: device_address.into(),
            credential: credential.into(),
        }
    }

    /// Returns `true` if this credential was issued by the device at `address`
    /// and is non-empty.
    ///
    /// Host names compare case-insensitively; surrounding whitespace is ignored.
    pub fn applies_to(&self, address: &str) -> bool {
        !self.credential.is_empty()
            && self
                .device_address
                .trim()
                .eq_ignore_ascii_case(address.trim())
    }
}
