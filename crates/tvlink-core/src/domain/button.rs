//! Remote-control button names.

use std::fmt;

use thiserror::Error;

/// Rejection reason for a button name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ButtonNameError {
    #[error("button name is empty")]
    Empty,
    #[error("button name {0:?} contains characters other than A-Z, 0-9 and '_'")]
    InvalidCharacters(String),
}

/// A validated, upper-cased button name such as `HOME`, `BACK`, or `VOLUMEUP`.
///
/// The device accepts an open-ended set of names, so this type validates
/// shape only; it does not keep a list of known buttons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ButtonName(String);

impl ButtonName {
    /// Validates and normalizes `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ButtonNameError`] for empty names or names containing
    /// anything other than ASCII letters, digits, and underscores.
    pub fn parse(name: &str) -> Result<Self, ButtonNameError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ButtonNameError::Empty);
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ButtonNameError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ButtonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
