//! tvlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does tvlink-client do?
//!
//! It owns the one live session between this process and a display device:
//!
//! 1. Tries the device's candidate endpoints (secure first) until one opens.
//! 2. Runs the pairing handshake, attaching a stored credential when one was
//!    issued by the same device, and persists any new credential.
//! 3. Correlates requests with responses over the single WebSocket and keeps
//!    the foreground-app and volume subscriptions alive.
//! 4. Opens a secondary pointer channel for low-latency motion and clicks.
//! 5. Folds all status traffic into one snapshot and pushes every change to
//!    a single listener.

/// Application layer: the session client, pairing, and status aggregation.
pub mod application;

/// Caller-facing error taxonomy.
pub mod error;

/// Infrastructure layer: sockets, configuration, credential storage, discovery.
pub mod infrastructure;

pub use application::session::RemoteClient;
pub use error::{ClientError, EndpointFailure};
