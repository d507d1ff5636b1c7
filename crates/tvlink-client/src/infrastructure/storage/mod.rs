//! Storage infrastructure: configuration file and credential persistence.
//!
//! - [`config`] reads and writes the TOML client configuration from the
//!   platform-appropriate directory, with defaults for every field.
//! - [`credentials`] is the credential store collaborator: the session only
//!   needs `load` and `save`, so it depends on the [`credentials::CredentialStore`]
//!   trait and never on a concrete file format.

pub mod config;
pub mod credentials;
