//! # SPI
//!
//! Deterministic service and plugin resolution across independently
//! packaged modules.
//!
//! ## Overview
//!
//! Every module ships plain `key=value` resources below a config root. The
//! engine merges them and picks **exactly one** implementation per service
//! contract and **all enabled** implementations, ordered, per plugin contract.
//! Integrators override those decisions without editing upstream files:
//!
//! | Tier                | Services                   | Plugins                        |
//! |---------------------|----------------------------|--------------------------------|
//! | Override variable   | `apply.<contract> = id`    | `ignore.<contract> = a, b(x)`  |
//! | Resource            | `service-apply.properties` | `plugin-ignore.properties`     |
//! | Fallback            | highest level              | priority ascending             |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────────────────────┐
//! │  SpiRegistry │────▶│   Loader    │────▶│ load_service::<dyn Greeter>  │──▶ Box<dyn Greeter>
//! │   (cache)    │     │ (immutable) │────▶│ load_plugins::<dyn Filter>   │──▶ Vec<Box<dyn Filter>>
//! └──────────────┘     └─────────────┘     └──────────────────────────────┘
//! ```
//!
//! - **Registry**: caches one loader per `(enumerator context, config root)`
//! - **Loader**: resolved decisions for one config root; builds fresh objects per call
//! - **Implementations**: constructor functions registered with `#[implementation]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spi::prelude::*;
//!
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! impl Contract for dyn Greeter {
//!     const NAME: &'static str = "demo.Greeter";
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self, name: &str) -> String {
//!         format!("Hello, {name}")
//!     }
//! }
//!
//! // META-INF/spi/service.properties:
//! //   demo.Greeter>english>library=demo.English
//! #[implementation(name = "demo.English", provides = dyn Greeter)]
//! fn english() -> English {
//!     English
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SpiRegistry::builder()
//!         .enumerator(DirectoryEnumerator::discover("modules")?)
//!         .settings(load_settings()?)
//!         .build();
//!
//!     let loader = registry.get_loader(DEFAULT_CONFIG_ROOT)?;
//!     if let Some(greeter) = loader.load_service::<dyn Greeter>()? {
//!         println!("{}", greeter.greet("world"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: Read `spi.toml` settings files (default)
//! - `yaml-config`: Read `spi.yaml` settings files
//! - `json-log`: Enable the JSON log format

pub use spi_core as core;
pub use spi_runtime as runtime;

pub use spi_macros::implementation;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use spi::prelude::*;
/// ```
pub mod prelude {
    // Registry and loader - main entry points
    pub use spi_runtime::{Loader, LoaderKey, SpiRegistry};

    // Settings
    pub use spi_runtime::SpiSettings;
    pub use spi_runtime::config::{SettingsLoader, load_settings};

    // Implementations
    pub use spi_core::{BoxError, Contract, FactoryRegistry, Parameters};
    pub use spi_macros::implementation;

    // Resource enumeration
    pub use spi_core::{
        DEFAULT_CONFIG_ROOT, DirectoryEnumerator, EmbeddedEnumerator, ResourceEnumerator,
    };

    // Diagnostics and errors
    pub use spi_core::{DiagnosticRecord, DiagnosticSink, Severity, SpiError, SpiResult, Verbosity};
}
