//! SPI Runtime - loader cache, settings and logging for the spi engine.
//!
//! This crate provides:
//! - Process-wide override variables (`SpiSettings`, `SettingsLoader`)
//! - Fully resolved, immutable loaders (`Loader`)
//! - The loader cache (`SpiRegistry`)
//! - Logging configuration (`LoggingBuilder`)
//!
//! ```ignore
//! use spi_runtime::{SpiRegistry, config::load_settings, logging};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = load_settings()?;
//!     logging::init_from_settings(&settings);
//!
//!     let registry = SpiRegistry::builder().settings(settings).build();
//!     let loader = registry.get_loader("META-INF/spi/")?;
//!
//!     if let Some(greeter) = loader.load_service::<dyn Greeter>()? {
//!         println!("{}", greeter.greet("world"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod loader;
pub mod logging;
pub mod registry;

// Re-exports
pub use config::{SettingsError, SettingsLoader, SettingsResult, SpiSettings};
pub use loader::{Loader, LoaderKey, LoaderOptions};
pub use logging::{LoggingBuilder, SpanEvents};
pub use registry::{RegistryStats, SpiRegistry, SpiRegistryBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;
