//! # SPI Core
//!
//! Resolution engine for layered service and plugin configuration.
//!
//! Configuration resources are scattered across independently packaged
//! modules. This crate merges them and decides, deterministically:
//!
//! - **Services**: exactly one applied implementation per contract
//! - **Plugins**: every enabled implementation per contract, ordered by priority
//!
//! Downstream integrators override decisions through apply records, ignore
//! rules and process-wide override variables without editing upstream files.
//!
//! ## Pipeline
//!
//! ```text
//! ┌────────────────────┐     ┌──────────────┐     ┌────────────────┐     ┌───────────────┐
//! │ ResourceEnumerator │────▶│ ConfigParser │────▶│ ResolvedConfig │────▶│ instantiation │
//! │  (dir / embedded)  │     │  (records)   │     │ (service/plug) │     │  (factories)  │
//! └────────────────────┘     └──────────────┘     └────────────────┘     └───────────────┘
//! ```
//!
//! ## Resource Layout
//!
//! Below a config root (default `META-INF/spi/`):
//!
//! | File                       | Key                       | Value                 |
//! |----------------------------|---------------------------|-----------------------|
//! | `service.properties`       | `interface>id>level`      | `impl` or `impl(arg)` |
//! | `service-apply.properties` | `interface`               | service id            |
//! | `plugin.properties`        | `interface>priority`      | `impl` or `impl(arg)` |
//! | `plugin-ignore.properties` | `interface`               | `impl, impl(arg)`     |
//! | `parameter/<name>`         | any                       | any                   |

pub mod definition;
pub mod diagnostics;
pub mod error;
pub mod factory;
pub mod instantiate;
pub mod parse;
pub mod properties;
pub mod resolve;
pub mod resource;

// Used by `#[implementation(...)]` expansions.
#[doc(hidden)]
pub use linkme;

pub use definition::{
    ApplyOverride, IgnoreRule, Implementation, Level, PluginDefinition, ServiceDefinition,
};
pub use diagnostics::{
    DiagnosticRecord, DiagnosticSink, Diagnostics, RecordingSink, Severity, TracingSink,
    Verbosity,
};
pub use error::{
    BoxError, ConflictError, InstantiationError, InstantiationResult, SpiError, SpiResult,
    SyntaxError, SyntaxResult,
};
pub use factory::{
    ConstructResult, Constructor, Contract, FactoryRegistry, IMPLEMENTATIONS,
    ImplementationEntry, Instance,
};
pub use instantiate::{InstantiationContext, Parameters};
pub use parse::{
    ConfigParser, DEFAULT_CONFIG_ROOT, LOGGER_CONFIG_ROOT, PARAMETER_DIR, PLUGIN_FILE,
    PLUGIN_IGNORE_FILE, ParsedConfig, SERVICE_APPLY_FILE, SERVICE_FILE, normalize_root,
};
pub use properties::Properties;
pub use resolve::{
    ApplyReason, MAX_INFO_PLUGIN_LINES, PluginResolution, ResolutionOverrides, ResolvedConfig,
    ServiceResolution,
};
pub use resource::{
    DirectoryEnumerator, EmbeddedEnumerator, Resource, ResourceEnumerator, ResourceRef,
    fingerprint,
};
