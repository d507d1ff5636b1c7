//! Opening WebSocket transports to the device.
//!
//! The device serves `wss://` with a self-signed certificate that no trust
//! store will ever validate, so the TLS connector accepts any certificate
//! and host name.  Plain `ws://` URLs go through the same call; the
//! connector is simply not used for them.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, Connector, MaybeTlsStream,
    WebSocketStream,
};
use tracing::debug;

use super::TransportError;

/// A connected client WebSocket, plain or TLS.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a split [`WsStream`].
pub type WsSink = SplitSink<WsStream, Message>;

/// Read half of a split [`WsStream`].
pub type WsSource = SplitStream<WsStream>;

/// Builds the TLS connector used for `wss://` endpoints.
///
/// # Errors
///
/// Returns [`TransportError::Tls`] if the platform TLS backend cannot be
/// initialised.
pub fn tls_connector() -> Result<native_tls::TlsConnector, TransportError> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(connector)
}

/// Opens a WebSocket to `url`, giving up after `timeout`.
///
/// The timeout covers TCP connect, TLS negotiation, and the WebSocket
/// upgrade together.  Nothing is retried here; the caller decides whether
/// to move on to another endpoint.
///
/// # Errors
///
/// Returns [`TransportError::ConnectFailed`] if the socket cannot be opened
/// and [`TransportError::Timeout`] if it does not open in time.
pub async fn open(url: &str, timeout: Duration) -> Result<WsStream, TransportError> {
    let connector = Connector::NativeTls(tls_connector()?);
    debug!("opening {url}");

    let attempt = connect_async_tls_with_config(url, None, false, Some(connector));
    match time::timeout(timeout, attempt).await {
        Ok(Ok((stream, _response))) => {
            debug!("opened {url}");
            Ok(stream)
        }
        Ok(Err(source)) => Err(TransportError::ConnectFailed {
            url: url.to_string(),
            source,
        }),
        Err(_) => Err(TransportError::Timeout {
            url: url.to_string(),
            after: timeout,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
