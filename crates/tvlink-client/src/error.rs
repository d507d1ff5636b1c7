//! Errors surfaced by [`RemoteClient`](crate::RemoteClient) operations.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tvlink_core::ProtocolError;

use crate::infrastructure::network::TransportError;

/// One failed connection attempt, kept for the aggregated connect error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    /// URL of the endpoint that was tried.
    pub endpoint: String,
    /// Why the attempt failed (transport error, timeout, or handshake failure).
    pub reason: String,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.reason)
    }
}

fn list_attempts(attempts: &[EndpointFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error type for every public client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Every candidate endpoint failed to open or to complete the handshake.
    #[error("all {} endpoint attempt(s) failed: [{}]", .attempts.len(), list_attempts(.attempts))]
    AllEndpointsFailed { attempts: Vec<EndpointFailure> },

    /// The device explicitly refused the handshake.  Not retried.
    #[error("handshake rejected by device: {0}")]
    HandshakeRejected(String),

    /// No answer arrived for a request within the request timeout.
    #[error("request {id} timed out after {after:?}")]
    RequestTimeout { id: String, after: Duration },

    /// A command was issued while the session is not `ready`.
    #[error("not connected")]
    NotConnected,

    /// The device answered a command with an `error` message.
    #[error("device error: {0}")]
    Device(String),

    /// The command arguments were rejected before anything was sent.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Writing to the open transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
