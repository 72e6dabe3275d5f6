//! Config parser.
//!
//! Reads the four resource families below one config root and turns them into
//! typed records. Syntax problems abort immediately; conflicts that only an
//! override variable can settle are recorded for the resolution pass.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::definition::{
    ApplyOverride, IgnoreRule, Implementation, PluginDefinition, ServiceDefinition,
};
use crate::diagnostics::Diagnostics;
use crate::error::{ConflictError, SpiError, SpiResult, SyntaxError};
use crate::properties::Properties;
use crate::resolve::ResolutionOverrides;
use crate::resource::{Resource, ResourceEnumerator, ResourceRef};

/// Config root used when the caller passes none.
pub const DEFAULT_CONFIG_ROOT: &str = "META-INF/spi/";
/// Config root searched for a custom diagnostic sink.
pub const LOGGER_CONFIG_ROOT: &str = "META-INF/spi-logger/";

/// Service definitions, `interface>id>level=impl`.
pub const SERVICE_FILE: &str = "service.properties";
/// Apply records, `interface=id`.
pub const SERVICE_APPLY_FILE: &str = "service-apply.properties";
/// Plugin definitions, `interface>priority=impl`.
pub const PLUGIN_FILE: &str = "plugin.properties";
/// Ignore rules, `interface=impl,impl(arg)`.
pub const PLUGIN_IGNORE_FILE: &str = "plugin-ignore.properties";
/// Directory holding parameter resources, relative to the config root.
pub const PARAMETER_DIR: &str = "parameter/";

/// Key shape of apply and ignore records.
const CONTRACT_KEY_FORMAT: &str = "interface";

/// Normalises a config root: blank means [`DEFAULT_CONFIG_ROOT`], otherwise
/// leading slashes are dropped and a trailing `/` is ensured.
pub fn normalize_root(root: &str) -> String {
    let root = root.trim().trim_start_matches('/');
    if root.is_empty() {
        return DEFAULT_CONFIG_ROOT.to_string();
    }
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{root}/")
    }
}

/// Every record found below one config root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConfig {
    /// Service definitions by contract, then id.
    pub services: BTreeMap<String, BTreeMap<String, ServiceDefinition>>,
    /// Merged apply record per contract.
    pub applies: BTreeMap<String, ApplyOverride>,
    /// Plugin definitions by contract, in discovery order.
    pub plugins: BTreeMap<String, Vec<PluginDefinition>>,
    /// Ignore rules by contract, in discovery order.
    pub ignores: BTreeMap<String, Vec<IgnoreRule>>,
}

/// Parses the resources below one config root.
pub struct ConfigParser<'a> {
    enumerator: &'a dyn ResourceEnumerator,
    overrides: &'a ResolutionOverrides,
    diagnostics: &'a Diagnostics,
    config_root: String,
}

impl<'a> ConfigParser<'a> {
    /// Creates a parser for `config_root`, which is normalised.
    pub fn new(
        enumerator: &'a dyn ResourceEnumerator,
        overrides: &'a ResolutionOverrides,
        diagnostics: &'a Diagnostics,
        config_root: &str,
    ) -> Self {
        Self {
            enumerator,
            overrides,
            diagnostics,
            config_root: normalize_root(config_root),
        }
    }

    /// Returns the normalised config root.
    pub fn config_root(&self) -> &str {
        &self.config_root
    }

    /// Reads all four resource families.
    pub fn parse(&self) -> SpiResult<ParsedConfig> {
        Ok(ParsedConfig {
            services: self.parse_services()?,
            applies: self.parse_applies()?,
            plugins: self.parse_plugins()?,
            ignores: self.parse_ignores()?,
        })
    }

    /// Reads `service.properties`; a duplicate id is a conflict.
    pub fn parse_services(&self) -> SpiResult<BTreeMap<String, BTreeMap<String, ServiceDefinition>>> {
        let mut services: BTreeMap<String, BTreeMap<String, ServiceDefinition>> = BTreeMap::new();
        for (resource, properties) in self.load(SERVICE_FILE)? {
            for (key, value) in properties.iter() {
                let definition =
                    ServiceDefinition::from_entry(key, value, &self.config_root, resource.location())?;
                self.diagnostics.debug(format!(
                    "Service definition found: {}>{} => {definition}",
                    definition.contract, definition.id
                ));

                match services
                    .entry(definition.contract.clone())
                    .or_default()
                    .entry(definition.id.clone())
                {
                    Entry::Occupied(existing) => {
                        return Err(ConflictError::DuplicateId {
                            contract: definition.contract,
                            id: definition.id,
                            first: existing.get().source.to_string(),
                            second: definition.source.to_string(),
                        }
                        .into());
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(definition);
                    }
                }
            }
        }
        Ok(services)
    }

    /// Reads `service-apply.properties`.
    ///
    /// Records naming the same id merge with a warning. Records naming
    /// different ids are a conflict, tolerated here only when an apply
    /// override variable is set for the contract.
    pub fn parse_applies(&self) -> SpiResult<BTreeMap<String, ApplyOverride>> {
        let mut applies: BTreeMap<String, ApplyOverride> = BTreeMap::new();
        for (resource, properties) in self.load(SERVICE_APPLY_FILE)? {
            let source = resource.location();
            for (key, value) in properties.iter() {
                let contract = contract_key(key, source)?;
                let chosen_id = value.trim();
                if chosen_id.is_empty() {
                    return Err(SyntaxError::EmptyValue {
                        key: contract,
                        resource: source.to_string(),
                    }
                    .into());
                }
                self.diagnostics.debug(format!(
                    "Apply record found: {contract} => {chosen_id}, in {source}"
                ));

                let existing = match applies.entry(contract.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(ApplyOverride {
                            contract,
                            chosen_id: chosen_id.to_string(),
                            source: source.clone(),
                            conflict: None,
                        });
                        continue;
                    }
                    Entry::Occupied(slot) => slot.into_mut(),
                };

                if existing.chosen_id == chosen_id {
                    self.diagnostics.warn(format!(
                        "Duplicate apply record for {contract} => {chosen_id}, in {} and {source}",
                        existing.source
                    ));
                    continue;
                }

                let conflict = ConflictError::ApplyDisagreement {
                    contract: contract.clone(),
                    first_id: existing.chosen_id.clone(),
                    first: existing.source.to_string(),
                    second_id: chosen_id.to_string(),
                    second: source.to_string(),
                };
                if !self.overrides.apply.contains_key(&contract) {
                    return Err(conflict.into());
                }
                self.diagnostics.warn(format!(
                    "{conflict}; deferred to override variable {}",
                    ResolutionOverrides::apply_variable(&contract)
                ));
                existing.conflict.get_or_insert(conflict);
            }
        }
        Ok(applies)
    }

    /// Reads `plugin.properties`.
    pub fn parse_plugins(&self) -> SpiResult<BTreeMap<String, Vec<PluginDefinition>>> {
        let mut plugins: BTreeMap<String, Vec<PluginDefinition>> = BTreeMap::new();
        for (resource, properties) in self.load(PLUGIN_FILE)? {
            for (key, value) in properties.iter() {
                let definition =
                    PluginDefinition::from_entry(key, value, &self.config_root, resource.location())?;
                self.diagnostics.debug(format!(
                    "Plugin definition found: {} => {definition}",
                    definition.contract
                ));
                plugins
                    .entry(definition.contract.clone())
                    .or_default()
                    .push(definition);
            }
        }
        Ok(plugins)
    }

    /// Reads `plugin-ignore.properties`; values are comma-separated.
    pub fn parse_ignores(&self) -> SpiResult<BTreeMap<String, Vec<IgnoreRule>>> {
        let mut ignores: BTreeMap<String, Vec<IgnoreRule>> = BTreeMap::new();
        for (resource, properties) in self.load(PLUGIN_IGNORE_FILE)? {
            let source = resource.location();
            for (key, value) in properties.iter() {
                let contract = contract_key(key, source)?;
                if value.trim().is_empty() {
                    return Err(SyntaxError::EmptyValue {
                        key: contract,
                        resource: source.to_string(),
                    }
                    .into());
                }
                let rules = ignores.entry(contract.clone()).or_default();
                for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let ignored = Implementation::parse(item, &contract, source.as_str())?;
                    self.diagnostics
                        .debug(format!("Ignore rule found: {contract} => {ignored}, in {source}"));
                    rules.push(IgnoreRule {
                        contract: contract.clone(),
                        ignored,
                        source: source.clone(),
                    });
                }
            }
        }
        Ok(ignores)
    }

    /// Enumerates `<root><file>`, drops excluded fingerprints, parses the rest.
    fn load(&self, file: &str) -> SpiResult<Vec<(Resource, Properties)>> {
        let path = format!("{}{file}", self.config_root);
        let resources = self
            .enumerator
            .enumerate(&path)
            .map_err(|e| SpiError::resource(path.clone(), e))?;

        let mut loaded = Vec::with_capacity(resources.len());
        for resource in resources {
            let fingerprint = resource.fingerprint();
            if self.overrides.file_exclusion.contains(&fingerprint) {
                self.diagnostics.info(format!(
                    "Excluded resource skipped: {}, fingerprint {fingerprint}",
                    resource.location()
                ));
                continue;
            }
            self.diagnostics.debug(format!(
                "Loading {}, fingerprint {fingerprint}",
                resource.location()
            ));

            let properties = Properties::from_bytes(resource.bytes(), resource.location().as_str())?;
            if properties.is_empty() {
                self.diagnostics
                    .warn(format!("Resource has no entries: {}", resource.location()));
            }
            loaded.push((resource, properties));
        }
        Ok(loaded)
    }
}

/// Validates the key of an apply or ignore record.
fn contract_key(key: &str, source: &ResourceRef) -> Result<String, SyntaxError> {
    let contract = key.trim();
    if contract.is_empty() || contract.contains('>') {
        return Err(SyntaxError::IllegalKey {
            key: key.to_string(),
            expected: CONTRACT_KEY_FORMAT,
            resource: source.to_string(),
        });
    }
    Ok(contract.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::definition::Level;
    use crate::diagnostics::{RecordingSink, Verbosity};
    use crate::resource::{EmbeddedEnumerator, fingerprint};

    fn parse_with(
        enumerator: &EmbeddedEnumerator,
        overrides: &ResolutionOverrides,
    ) -> (SpiResult<ParsedConfig>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let diagnostics = Diagnostics::new(1, Verbosity::Debug, sink.clone());
        let parser = ConfigParser::new(enumerator, overrides, &diagnostics, "META-INF/spi");
        (parser.parse(), sink)
    }

    fn service(module: &str, text: &str) -> EmbeddedEnumerator {
        EmbeddedEnumerator::new("test").with(module, "META-INF/spi/service.properties", text)
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_root(""), DEFAULT_CONFIG_ROOT);
        assert_eq!(normalize_root("  "), DEFAULT_CONFIG_ROOT);
        assert_eq!(normalize_root("/custom/root"), "custom/root/");
        assert_eq!(normalize_root("custom/"), "custom/");
    }

    #[test]
    fn test_services_merge_across_modules() {
        let enumerator = service("a", "demo.Greeter>english>library=demo.English\n").with(
            "b",
            "META-INF/spi/service.properties",
            "demo.Greeter>french>platform=demo.French(bonjour)\n",
        );
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        let parsed = parsed.unwrap();
        let greeter = &parsed.services["demo.Greeter"];
        assert_eq!(greeter.len(), 2);
        assert_eq!(greeter["french"].level, Level::Platform);
        assert_eq!(greeter["french"].config_root, "META-INF/spi/");
        assert_eq!(
            greeter["english"].source.as_str(),
            "embedded:a/META-INF/spi/service.properties"
        );
    }

    #[test]
    fn test_duplicate_service_id_is_conflict() {
        let enumerator = service("a", "demo.Greeter>english>library=demo.English\n").with(
            "b",
            "META-INF/spi/service.properties",
            "demo.Greeter>english>application=demo.Other\n",
        );
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        match parsed.unwrap_err() {
            SpiError::Conflict(ConflictError::DuplicateId { id, first, second, .. }) => {
                assert_eq!(id, "english");
                assert!(first.starts_with("embedded:a/"));
                assert!(second.starts_with("embedded:b/"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_syntax_error_aborts() {
        let enumerator = service("a", "demo.Greeter>english>vendor=demo.English\n");
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        assert!(matches!(
            parsed,
            Err(SpiError::Syntax(SyntaxError::UndefinedLevel { .. }))
        ));
    }

    #[test]
    fn test_excluded_fingerprint_contributes_nothing() {
        let text = "demo.Greeter>english>library=demo.English\n";
        let enumerator = service("a", text);
        let overrides = ResolutionOverrides::default().exclude(fingerprint(text.as_bytes()));
        let (parsed, sink) = parse_with(&enumerator, &overrides);
        assert!(parsed.unwrap().services.is_empty());
        assert!(
            sink.messages(crate::diagnostics::Severity::Info)
                .iter()
                .any(|m| m.starts_with("Excluded resource skipped"))
        );
    }

    #[test]
    fn test_empty_resource_warns() {
        let enumerator = service("a", "# nothing here\n");
        let (parsed, sink) = parse_with(&enumerator, &ResolutionOverrides::default());
        assert!(parsed.unwrap().services.is_empty());
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_apply_same_id_merges_with_warning() {
        let enumerator = EmbeddedEnumerator::new("test")
            .with("a", "META-INF/spi/service-apply.properties", "demo.Greeter=english")
            .with("b", "META-INF/spi/service-apply.properties", "demo.Greeter = english ");
        let (parsed, sink) = parse_with(&enumerator, &ResolutionOverrides::default());
        let apply = &parsed.unwrap().applies["demo.Greeter"];
        assert_eq!(apply.chosen_id, "english");
        assert!(apply.conflict.is_none());
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_apply_disagreement_is_fatal_without_override() {
        let enumerator = EmbeddedEnumerator::new("test")
            .with("a", "META-INF/spi/service-apply.properties", "demo.Greeter=english")
            .with("b", "META-INF/spi/service-apply.properties", "demo.Greeter=french");
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        assert!(matches!(
            parsed,
            Err(SpiError::Conflict(ConflictError::ApplyDisagreement { .. }))
        ));
    }

    #[test]
    fn test_apply_disagreement_deferred_with_override() {
        let enumerator = EmbeddedEnumerator::new("test")
            .with("a", "META-INF/spi/service-apply.properties", "demo.Greeter=english")
            .with("b", "META-INF/spi/service-apply.properties", "demo.Greeter=french");
        let overrides = ResolutionOverrides::default().with_apply("demo.Greeter", "german");
        let (parsed, _) = parse_with(&enumerator, &overrides);
        let apply = &parsed.unwrap().applies["demo.Greeter"];
        assert_eq!(apply.chosen_id, "english");
        assert!(apply.conflict.is_some());
    }

    #[test]
    fn test_apply_blank_key_rejected() {
        let enumerator = EmbeddedEnumerator::new("test").with(
            "a",
            "META-INF/spi/service-apply.properties",
            "demo.Greeter>english=x",
        );
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        assert!(matches!(
            parsed,
            Err(SpiError::Syntax(SyntaxError::IllegalKey { .. }))
        ));
    }

    #[test]
    fn test_plugins_keep_discovery_order() {
        let enumerator = EmbeddedEnumerator::new("test")
            .with("a", "META-INF/spi/plugin.properties", "demo.Filter>2=demo.A\n")
            .with(
                "b",
                "META-INF/spi/plugin.properties",
                "demo.Filter>1=demo.B\ndemo.Filter>2=demo.C\n",
            );
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        let names: Vec<_> = parsed.unwrap().plugins["demo.Filter"]
            .iter()
            .map(|d| d.implementation.name.clone())
            .collect();
        assert_eq!(names, vec!["demo.A", "demo.B", "demo.C"]);
    }

    #[test]
    fn test_ignore_values_split_on_commas() {
        let enumerator = EmbeddedEnumerator::new("test").with(
            "a",
            "META-INF/spi/plugin-ignore.properties",
            "demo.Filter=demo.A, demo.B(strict) ,",
        );
        let (parsed, _) = parse_with(&enumerator, &ResolutionOverrides::default());
        let rules = &parsed.unwrap().ignores["demo.Filter"];
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].ignored, Implementation::new("demo.A"));
        assert_eq!(rules[1].ignored, Implementation::with_arg("demo.B", "strict"));
    }
}
