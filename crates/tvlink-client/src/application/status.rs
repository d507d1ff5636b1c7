//! Status aggregation and listener notification.
//!
//! Two sources feed the snapshot: the session itself (state transitions,
//! target address) and the device (subscription answers and unsolicited
//! messages).  Every change produces exactly one notification carrying an
//! immutable copy of the whole snapshot; updates that change nothing are
//! swallowed.
//!
//! Notifications are pushed into an unbounded channel so that the reader
//! task delivering device updates never waits on the consumer.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tvlink_core::{SessionState, StatusPatch, StatusSnapshot};

/// Single-listener status aggregator.
#[derive(Default)]
pub struct StatusAggregator {
    snapshot: Mutex<StatusSnapshot>,
    listener: Mutex<Option<mpsc::UnboundedSender<StatusSnapshot>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the listener, replacing any previous one.
    pub fn set_listener(&self, listener: mpsc::UnboundedSender<StatusSnapshot>) {
        *lock(&self.listener) = Some(listener);
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        lock(&self.snapshot).clone()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.snapshot).session_state
    }

    /// Starts a connection attempt to `address`, forgetting the previous
    /// device's status.
    pub fn begin_session(&self, address: &str) {
        self.update(|snap| {
            snap.clear_device_fields();
            snap.device_address = Some(address.to_string());
            set_state(snap, SessionState::Connecting);
        });
    }

    /// Moves to `state`.
    pub fn set_state(&self, state: SessionState) {
        self.update(|snap| set_state(snap, state));
    }

    /// Returns to `disconnected` and clears everything learned from the device.
    ///
    /// The address is kept when `keep_address` is set, so the presentation
    /// layer can still show which device was lost.
    pub fn reset(&self, keep_address: bool) {
        self.update(|snap| {
            set_state(snap, SessionState::Disconnected);
            snap.clear_device_fields();
            if !keep_address {
                snap.device_address = None;
            }
        });
    }

    /// Merges a status-bearing payload.  Fields it lacks keep their value.
    pub fn apply_payload(&self, payload: &Value) {
        let patch = StatusPatch::from_payload(payload);
        if patch.is_empty() {
            debug!("payload carries no status fields");
            return;
        }
        self.update(|snap| {
            snap.apply(&patch);
        });
    }

    /// Applies `change` and notifies the listener if the snapshot differs.
    fn update(&self, change: impl FnOnce(&mut StatusSnapshot)) {
        let mut snap = lock(&self.snapshot);
        let before = snap.clone();
        change(&mut snap);
        if *snap == before {
            return;
        }

        // Sent while the snapshot lock is held so listeners observe changes
        // in the order they were applied.
        let mut listener = lock(&self.listener);
        if let Some(tx) = listener.as_ref() {
            if tx.send(snap.clone()).is_err() {
                debug!("status listener dropped; removing it");
                *listener = None;
            }
        }
    }
}

fn set_state(snap: &mut StatusSnapshot, next: SessionState) {
    let current = snap.session_state;
    if current == next {
        return;
    }
    if !current.can_transition_to(next) {
        warn!("unexpected session transition {current} -> {next}");
    }
    info!("session {current} -> {next}");
    snap.session_state = next;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
