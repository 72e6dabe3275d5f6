//! Settings module for the spi runtime.
//!
//! This module provides figment-based loading and validation of the
//! process-wide override variables.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{SettingsError, SettingsResult};
pub use loader::{SettingsLoader, load_settings, load_settings_from_file};
pub use schema::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig, SpiSettings};
pub use validation::validate_settings;
