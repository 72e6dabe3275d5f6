//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during settings loading and validation.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// File not found at the specified path.
    #[error("Settings file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is not an enabled format.
    #[error("Unsupported or disabled settings file format: .{0}")]
    UnsupportedFormat(String),

    /// The merged sources could not be extracted into `SpiSettings`.
    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    /// Invalid settings value.
    #[error("Invalid settings: {message}")]
    ValidationError { message: String },
}

impl SettingsError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;
