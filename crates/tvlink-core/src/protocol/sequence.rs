//! Thread-safe generator for main-channel request identifiers.
//!
//! Every outgoing request carries an `id` that the device echoes back in its
//! answer.  Identifiers must be unique for the lifetime of the process so
//! that a late answer from an earlier connection can never be mistaken for
//! the answer to a fresh request.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU64` internally, so many tasks can request ids
//! concurrently without a lock and never receive the same number twice.

use std::sync::atomic::{AtomicU64, Ordering};

use super::messages::MessageKind;

/// Produces ids of the form `<prefix>_<n>` with a strictly increasing `n`.
///
/// # Examples
///
/// ```rust
/// use tvlink_core::protocol::{MessageKind, RequestIdGenerator};
///
/// let ids = RequestIdGenerator::new();
/// assert_eq!(ids.next_id(MessageKind::Register), "register_0");
/// assert_eq!(ids.next_id(MessageKind::Request), "request_1");
/// ```
pub struct RequestIdGenerator {
    inner: AtomicU64,
}

impl RequestIdGenerator {
    /// Creates a new generator starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next raw sequence number.
    ///
    /// Wraps around from `u64::MAX` to 0 on overflow without panicking.
    /// `Relaxed` ordering is enough: the value only needs to be unique, it
    /// does not publish any other memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the next identifier for a message of `kind`.
    pub fn next_id(&self, kind: MessageKind) -> String {
        format!("{}_{}", kind.id_prefix(), self.next())
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
