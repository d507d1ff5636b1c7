//! Network infrastructure for the session client.
//!
//! Architecture:
//! - [`transport`] opens a WebSocket to one endpoint, secure or plain,
//!   accepting the device's self-signed certificate.
//! - [`channel::MainChannel`] owns the main socket: one writer behind a
//!   mutex, one reader task that decodes frames and hands them to the
//!   [`correlator::Correlator`].
//! - [`pointer::PointerChannel`] owns the optional low-latency pointer socket.
//!
//! Every socket attached to a channel is tagged with a generation number.
//! A reader that exits after its socket was replaced observes a stale
//! generation and leaves the newer session alone.

pub mod channel;
pub mod correlator;
pub mod pointer;
pub mod transport;

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised while opening or using a WebSocket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket could not be opened (refused, reset, bad handshake).
    #[error("failed to open {url}: {source}")]
    ConnectFailed {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    /// Opening the WebSocket took longer than the per-attempt timeout.
    #[error("timed out opening {url} after {after:?}")]
    Timeout { url: String, after: Duration },
    /// The TLS connector could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),
    /// An I/O error occurred on an established socket.
    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),
}
