//! Application layer for the session client.
//!
//! - **`session`** – [`RemoteClient`](session::RemoteClient): connect and
//!   disconnect, the endpoint selection loop, and the command API.
//! - **`handshake`** – Drives the pairing exchange over an open main channel
//!   and decides which credential to present and what to persist.
//! - **`status`** – Folds state transitions and device updates into one
//!   snapshot and pushes every change to the registered listener.

pub mod handshake;
pub mod session;
pub mod status;
