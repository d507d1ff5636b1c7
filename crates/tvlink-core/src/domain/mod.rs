//! Domain layer: session lifecycle and status types.
//!
//! Everything here is pure data plus the rules that govern it.  Nothing in
//! this module performs I/O, which keeps the state machine and the status
//! merge rules testable without a device.

pub mod button;
pub mod credential;
pub mod endpoint;
pub mod session;
pub mod status;
