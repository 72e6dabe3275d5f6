//! Plugin resolution: every enabled definition, ordered by priority.

use crate::definition::{IgnoreRule, Implementation, PluginDefinition};
use crate::diagnostics::{Diagnostics, Verbosity};
use crate::error::SyntaxResult;

use super::{MAX_INFO_PLUGIN_LINES, ResolutionOverrides};

/// Resolved state of one plugin contract. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResolution {
    /// Plugin contract name.
    pub contract: String,
    /// Enabled definitions, priority ascending, ties in discovery order.
    pub ordered: Vec<PluginDefinition>,
    /// Every definition in discovery order, with its enabled flag.
    pub definitions: Vec<PluginDefinition>,
}

impl PluginResolution {
    /// Returns the disabled definitions.
    pub fn disabled(&self) -> impl Iterator<Item = &PluginDefinition> {
        self.definitions.iter().filter(|d| !d.enabled)
    }
}

/// Applies the ignore override variable and the ignore rules of `contract`,
/// then orders what is left.
pub fn resolve(
    contract: &str,
    mut definitions: Vec<PluginDefinition>,
    rules: &[IgnoreRule],
    overrides: &ResolutionOverrides,
    diagnostics: &Diagnostics,
) -> SyntaxResult<PluginResolution> {
    if let Some(list) = overrides.ignore.get(contract) {
        let variable = ResolutionOverrides::ignore_variable(contract);
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let ignored = Implementation::parse(item, contract, &variable)?;
            disable(contract, &mut definitions, &ignored, &variable, diagnostics);
        }
    }

    for rule in rules {
        disable(
            contract,
            &mut definitions,
            &rule.ignored,
            rule.source.as_str(),
            diagnostics,
        );
    }

    let mut ordered: Vec<PluginDefinition> =
        definitions.iter().filter(|d| d.enabled).cloned().collect();
    ordered.sort_by_key(|d| d.priority);

    let resolution = PluginResolution {
        contract: contract.to_string(),
        ordered,
        definitions,
    };
    report(&resolution, diagnostics);
    Ok(resolution)
}

/// Disables every definition selected by `ignored`, recording `origin` as the
/// reason even if an earlier source disabled it. A miss is a warning.
fn disable(
    contract: &str,
    definitions: &mut [PluginDefinition],
    ignored: &Implementation,
    origin: &str,
    diagnostics: &Diagnostics,
) {
    let mut matched = 0usize;
    for definition in definitions
        .iter_mut()
        .filter(|d| ignored.selects(&d.implementation))
    {
        matched += 1;
        definition.enabled = false;
        definition.disable_reason = Some(origin.to_string());
    }
    if matched == 0 {
        diagnostics.warn(format!(
            "Ignored plugin {ignored} matches no definition of {contract}, in {origin}"
        ));
    }
}

fn report(resolution: &PluginResolution, diagnostics: &Diagnostics) {
    let contract = &resolution.contract;
    if diagnostics.enabled(Verbosity::Debug) {
        for definition in &resolution.ordered {
            diagnostics.debug(format!("Plugin enabled: {contract} => {definition}"));
        }
        for definition in resolution.disabled() {
            diagnostics.debug(format!("Plugin disabled: {contract} => {definition}"));
        }
        return;
    }

    for definition in resolution.ordered.iter().take(MAX_INFO_PLUGIN_LINES) {
        diagnostics.info(format!("Plugin enabled: {contract} => {definition}"));
    }
    let rest = resolution.ordered.len().saturating_sub(MAX_INFO_PLUGIN_LINES);
    if rest > 0 {
        diagnostics.info(format!("Plugin enabled: {contract} => ... {rest} more"));
    }
}
