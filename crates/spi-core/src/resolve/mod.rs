//! Resolution engine.
//!
//! Two independent algorithms run over a [`ParsedConfig`]:
//!
//! - [`service`]: pick exactly one definition per service contract
//! - [`plugin`]: pick and order every enabled definition per plugin contract
//!
//! Both consult the process-wide [`ResolutionOverrides`] first.

pub mod plugin;
pub mod service;

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::Diagnostics;
use crate::error::SpiResult;
use crate::parse::{ConfigParser, ParsedConfig};
use crate::resource::ResourceEnumerator;

pub use plugin::PluginResolution;
pub use service::{ApplyReason, ServiceResolution};

/// Plugin entries listed per contract at `info` verbosity.
pub const MAX_INFO_PLUGIN_LINES: usize = 10;

/// Process-wide override variables, as far as resolution is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionOverrides {
    /// Service id to apply, by contract.
    pub apply: BTreeMap<String, String>,
    /// Comma-separated implementations to disable, by contract.
    pub ignore: BTreeMap<String, String>,
    /// Fingerprints of resources to skip entirely.
    pub file_exclusion: BTreeSet<String>,
}

impl ResolutionOverrides {
    /// Pins `contract` to the service `id`.
    pub fn with_apply(mut self, contract: impl Into<String>, id: impl Into<String>) -> Self {
        self.apply.insert(contract.into(), id.into());
        self
    }

    /// Disables the comma-separated `implementations` of `contract`.
    pub fn with_ignore(
        mut self,
        contract: impl Into<String>,
        implementations: impl Into<String>,
    ) -> Self {
        self.ignore.insert(contract.into(), implementations.into());
        self
    }

    /// Excludes resources with the given fingerprint.
    pub fn exclude(mut self, fingerprint: impl Into<String>) -> Self {
        self.file_exclusion.insert(fingerprint.into());
        self
    }

    /// Display name of the apply variable for `contract`.
    pub fn apply_variable(contract: &str) -> String {
        format!("settings:apply.{contract}")
    }

    /// Display name of the ignore variable for `contract`.
    pub fn ignore_variable(contract: &str) -> String {
        format!("settings:ignore.{contract}")
    }
}

/// Fully resolved tables of one config root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Config root the tables were built from.
    pub config_root: String,
    /// One resolution per service contract.
    pub services: BTreeMap<String, ServiceResolution>,
    /// One resolution per plugin contract.
    pub plugins: BTreeMap<String, PluginResolution>,
}

impl ResolvedConfig {
    /// Parses and resolves everything below `config_root`.
    pub fn load(
        enumerator: &dyn ResourceEnumerator,
        config_root: &str,
        overrides: &ResolutionOverrides,
        diagnostics: &Diagnostics,
    ) -> SpiResult<Self> {
        let parser = ConfigParser::new(enumerator, overrides, diagnostics, config_root);
        let parsed = parser.parse()?;
        Self::resolve(parser.config_root(), parsed, overrides, diagnostics)
    }

    /// Runs both resolution algorithms over already parsed records.
    pub fn resolve(
        config_root: &str,
        parsed: ParsedConfig,
        overrides: &ResolutionOverrides,
        diagnostics: &Diagnostics,
    ) -> SpiResult<Self> {
        let ParsedConfig {
            services,
            mut applies,
            mut plugins,
            mut ignores,
        } = parsed;

        let mut resolved_services = BTreeMap::new();
        for (contract, definitions) in services {
            let apply = applies.remove(&contract);
            let resolution =
                service::resolve(&contract, definitions, apply.as_ref(), overrides, diagnostics)?;
            resolved_services.insert(contract, resolution);
        }
        for apply in applies.values() {
            diagnostics.warn(format!(
                "Apply record for {} => {} has no service definitions, in {}",
                apply.contract, apply.chosen_id, apply.source
            ));
        }

        let contracts: BTreeSet<String> = plugins.keys().chain(ignores.keys()).cloned().collect();
        let mut resolved_plugins = BTreeMap::new();
        for contract in contracts {
            let definitions = plugins.remove(&contract).unwrap_or_default();
            let rules = ignores.remove(&contract).unwrap_or_default();
            let resolution =
                plugin::resolve(&contract, definitions, &rules, overrides, diagnostics)?;
            if !resolution.definitions.is_empty() {
                resolved_plugins.insert(contract, resolution);
            }
        }

        Ok(Self {
            config_root: config_root.to_string(),
            services: resolved_services,
            plugins: resolved_plugins,
        })
    }

    /// Returns the resolution of a service contract.
    pub fn service(&self, contract: &str) -> Option<&ServiceResolution> {
        self.services.get(contract)
    }

    /// Returns the resolution of a plugin contract.
    pub fn plugin(&self, contract: &str) -> Option<&PluginResolution> {
        self.plugins.get(contract)
    }
}
