//! Connection lifecycle state machine.
//!
//! ```text
//!   disconnected ──connect──▶ connecting ──transport open──▶ pairing ──handshake ok──▶ ready
//!        ▲                        │  ▲                         │                         │
//!        └────────────────────────┴──┼─────────failure─────────┘                         │
//!        │                           └──next candidate endpoint┘                         │
//!        └───────────────────────────────transport closed / disconnect()─────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single session owned by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport; commands fail with `NotConnected`.
    #[default]
    Disconnected,
    /// Opening a transport to one of the candidate endpoints.
    Connecting,
    /// Transport open; handshake outstanding (possibly waiting for the user).
    Pairing,
    /// Handshake accepted; commands and subscriptions are live.
    Ready,
}

impl SessionState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// Any state may fall back to `Disconnected`.  `Pairing → Connecting` is
    /// allowed so the transport selector can move on to the next candidate
    /// endpoint after a failed attempt.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Pairing)
                | (Pairing, Ready)
                | (Pairing, Connecting)
        )
    }

    /// Returns `true` when commands may be issued.
    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Pairing => "pairing",
            SessionState::Ready => "ready",
        };
        f.write_str(s)
    }
}
