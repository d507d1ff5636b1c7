//! Observable status snapshot and partial-update merging.
//!
//! The device reports status in fragments: the foreground-app subscription
//! only mentions the app, the volume subscription only mentions audio, and
//! some firmware sends volume without mute or vice versa.  A [`StatusPatch`]
//! captures whatever one message carried; [`StatusSnapshot::apply`] merges it
//! so that absent fields keep their previous value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::session::SessionState;

/// Immutable copy of everything the presentation layer can show.
///
/// Serialized as the status event:
/// `{"sessionState":"ready","deviceAddress":"10.0.0.5","foregroundApp":null,"volume":12,"muted":false}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub session_state: SessionState,
    pub device_address: Option<String>,
    pub foreground_app: Option<String>,
    pub volume: Option<u32>,
    pub muted: Option<bool>,
}

impl StatusSnapshot {
    /// Merges `patch` into this snapshot.
    ///
    /// Returns `true` if any field actually changed.
    pub fn apply(&mut self, patch: &StatusPatch) -> bool {
        let mut changed = false;
        if let Some(app) = &patch.foreground_app {
            if self.foreground_app.as_ref() != Some(app) {
                self.foreground_app = Some(app.clone());
                changed = true;
            }
        }
        if let Some(volume) = patch.volume {
            if self.volume != Some(volume) {
                self.volume = Some(volume);
                changed = true;
            }
        }
        if let Some(muted) = patch.muted {
            if self.muted != Some(muted) {
                self.muted = Some(muted);
                changed = true;
            }
        }
        changed
    }

    /// Forgets everything learned from the device, keeping only the session
    /// state and address.
    pub fn clear_device_fields(&mut self) {
        self.foreground_app = None;
        self.volume = None;
        self.muted = None;
    }
}

/// Fields extracted from a single status-bearing payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusPatch {
    pub foreground_app: Option<String>,
    pub volume: Option<u32>,
    pub muted: Option<bool>,
}

impl StatusPatch {
    /// Extracts status fields from a response or subscription payload.
    ///
    /// Recognized shapes:
    ///
    /// ```json
    /// {"appId": "netflix"}
    /// {"volume": 12, "muted": false}
    /// {"volumeStatus": {"volume": 12, "muteStatus": false}}
    /// ```
    pub fn from_payload(payload: &Value) -> Self {
        let mut patch = StatusPatch {
            foreground_app: payload
                .get("appId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            volume: payload.get("volume").and_then(as_volume),
            muted: payload.get("muted").and_then(Value::as_bool),
        };

        if let Some(nested) = payload.get("volumeStatus") {
            if patch.volume.is_none() {
                patch.volume = nested.get("volume").and_then(as_volume);
            }
            if patch.muted.is_none() {
                patch.muted = nested.get("muteStatus").and_then(Value::as_bool);
            }
        }
        patch
    }

    /// Returns `true` if the payload carried no status field at all.
    pub fn is_empty(&self) -> bool {
        self.foreground_app.is_none() && self.volume.is_none() && self.muted.is_none()
    }
}

fn as_volume(value: &Value) -> Option<u32> {
    // Some firmware reports -1 while the audio output is switching.
    match value.as_u64() {
        Some(v) => u32::try_from(v).ok(),
        None => {
            debug!("ignoring non-numeric or negative volume value: {value}");
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
