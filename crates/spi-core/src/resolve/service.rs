//! Service resolution: exactly one applied definition per contract.
//!
//! Precedence, first match wins:
//!
//! 1. the apply override variable, if it names a known id
//! 2. the merged apply record, if it carries no unresolved conflict and
//!    names a known id
//! 3. the single definition with the highest level

use std::collections::BTreeMap;
use std::fmt;

use crate::definition::{ApplyOverride, Level, ServiceDefinition};
use crate::diagnostics::{Diagnostics, Verbosity};
use crate::error::ConflictError;
use crate::resource::ResourceRef;

use super::ResolutionOverrides;

/// Why a definition was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyReason {
    /// Named by the apply override variable.
    OverrideVariable {
        /// Display name of the variable.
        variable: String,
    },
    /// Named by an apply record.
    ApplyRecord {
        /// Resource holding the record.
        source: ResourceRef,
    },
    /// The only definition at the highest level.
    Level(Level),
}

impl fmt::Display for ApplyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverrideVariable { variable } => write!(f, "applied by {variable}"),
            Self::ApplyRecord { source } => write!(f, "applied by {source}"),
            Self::Level(level) => write!(f, "highest level {level}"),
        }
    }
}

/// Resolved state of one service contract. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResolution {
    /// Service contract name.
    pub contract: String,
    /// The applied definition.
    pub applied: ServiceDefinition,
    /// Why it was applied.
    pub reason: ApplyReason,
    /// Every definition of the contract, by id.
    pub definitions: BTreeMap<String, ServiceDefinition>,
}

/// Picks the applied definition of `contract`.
pub fn resolve(
    contract: &str,
    definitions: BTreeMap<String, ServiceDefinition>,
    apply: Option<&ApplyOverride>,
    overrides: &ResolutionOverrides,
    diagnostics: &Diagnostics,
) -> Result<ServiceResolution, ConflictError> {
    let (applied, reason) = select(contract, &definitions, apply, overrides, diagnostics)?;

    diagnostics.info(format!("Service applied: {contract} => {applied}"));
    if diagnostics.enabled(Verbosity::Debug) {
        diagnostics.debug(format!("Service {contract}: {reason}"));
        for definition in definitions.values().filter(|d| d.id != applied.id) {
            diagnostics.debug(format!("Service candidate: {contract} => {definition}"));
        }
    }

    Ok(ServiceResolution {
        contract: contract.to_string(),
        applied: applied.clone(),
        reason,
        definitions,
    })
}

fn select<'d>(
    contract: &str,
    definitions: &'d BTreeMap<String, ServiceDefinition>,
    apply: Option<&ApplyOverride>,
    overrides: &ResolutionOverrides,
    diagnostics: &Diagnostics,
) -> Result<(&'d ServiceDefinition, ApplyReason), ConflictError> {
    if let Some(id) = overrides.apply.get(contract) {
        let variable = ResolutionOverrides::apply_variable(contract);
        match definitions.get(id.trim()) {
            Some(definition) => {
                return Ok((definition, ApplyReason::OverrideVariable { variable }));
            }
            None => diagnostics.warn(format!(
                "Service id '{id}' named by {variable} is undefined for {contract}, falling through"
            )),
        }
    }

    if let Some(apply) = apply {
        if let Some(conflict) = &apply.conflict {
            return Err(conflict.clone());
        }
        match definitions.get(&apply.chosen_id) {
            Some(definition) => {
                return Ok((
                    definition,
                    ApplyReason::ApplyRecord {
                        source: apply.source.clone(),
                    },
                ));
            }
            None => diagnostics.warn(format!(
                "Service id '{}' named in {} is undefined for {contract}, falling through",
                apply.chosen_id, apply.source
            )),
        }
    }

    // Parsed tables never hold a contract without definitions.
    let Some(top) = definitions.values().map(|d| d.level).max() else {
        return Err(ConflictError::AmbiguousLevel {
            contract: contract.to_string(),
            conflicts: Vec::new(),
        });
    };
    let mut highest = definitions.values().filter(|d| d.level == top);
    match (highest.next(), highest.next()) {
        (Some(only), None) => Ok((only, ApplyReason::Level(top))),
        _ => Err(ConflictError::AmbiguousLevel {
            contract: contract.to_string(),
            conflicts: definitions
                .values()
                .filter(|d| d.level == top)
                .map(ToString::to_string)
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::definition::Implementation;
    use crate::diagnostics::RecordingSink;

    const CONTRACT: &str = "demo.Greeter";

    fn def(id: &str, level: Level, module: &str) -> ServiceDefinition {
        ServiceDefinition {
            contract: CONTRACT.into(),
            id: id.into(),
            level,
            implementation: Implementation::new(format!("demo.{id}")),
            config_root: "META-INF/spi/".into(),
            source: ResourceRef::new(format!("embedded:{module}/META-INF/spi/service.properties")),
        }
    }

    fn table(defs: Vec<ServiceDefinition>) -> BTreeMap<String, ServiceDefinition> {
        defs.into_iter().map(|d| (d.id.clone(), d)).collect()
    }

    fn apply_record(id: &str) -> ApplyOverride {
        ApplyOverride {
            contract: CONTRACT.into(),
            chosen_id: id.into(),
            source: ResourceRef::new("embedded:app/META-INF/spi/service-apply.properties"),
            conflict: None,
        }
    }

    fn run(
        defs: Vec<ServiceDefinition>,
        apply: Option<ApplyOverride>,
        overrides: ResolutionOverrides,
    ) -> (Result<ServiceResolution, ConflictError>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let diagnostics = Diagnostics::new(0, Verbosity::Info, sink.clone());
        let result = resolve(CONTRACT, table(defs), apply.as_ref(), &overrides, &diagnostics);
        (result, sink)
    }

    #[test]
    fn test_single_definition_applies_at_any_level() {
        for level in [Level::Default, Level::Library, Level::Platform, Level::Application] {
            let (result, _) = run(vec![def("only", level, "a")], None, Default::default());
            let resolution = result.unwrap();
            assert_eq!(resolution.applied.id, "only");
            assert_eq!(resolution.reason, ApplyReason::Level(level));
        }
    }

    #[test]
    fn test_highest_level_wins() {
        let (result, _) = run(
            vec![
                def("x", Level::Library, "a"),
                def("y", Level::Library, "b"),
                def("z", Level::Platform, "c"),
            ],
            None,
            Default::default(),
        );
        assert_eq!(result.unwrap().applied.id, "z");
    }

    #[test]
    fn test_same_level_is_ambiguous() {
        let (result, _) = run(
            vec![def("x", Level::Library, "a"), def("y", Level::Library, "b")],
            None,
            Default::default(),
        );
        match result.unwrap_err() {
            ConflictError::AmbiguousLevel { conflicts, .. } => {
                assert_eq!(conflicts.len(), 2);
                assert!(conflicts[0].contains("embedded:a/"));
                assert!(conflicts[1].contains("embedded:b/"));
            }
            other => panic!("unexpected conflict: {other}"),
        }
    }

    #[test]
    fn test_override_variable_settles_ambiguity() {
        let (result, sink) = run(
            vec![def("x", Level::Library, "a"), def("y", Level::Library, "b")],
            None,
            ResolutionOverrides::default().with_apply(CONTRACT, "y"),
        );
        let resolution = result.unwrap();
        assert_eq!(resolution.applied.id, "y");
        assert_eq!(
            resolution.reason,
            ApplyReason::OverrideVariable {
                variable: "settings:apply.demo.Greeter".into()
            }
        );
        assert!(sink.warnings().is_empty());
    }

    #[test]
    fn test_unknown_override_falls_through_with_warning() {
        let (result, sink) = run(
            vec![def("x", Level::Library, "a"), def("y", Level::Platform, "b")],
            None,
            ResolutionOverrides::default().with_apply(CONTRACT, "nope"),
        );
        assert_eq!(result.unwrap().applied.id, "y");
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_apply_record_beats_level() {
        let (result, _) = run(
            vec![def("x", Level::Library, "a"), def("y", Level::Application, "b")],
            Some(apply_record("x")),
            Default::default(),
        );
        let resolution = result.unwrap();
        assert_eq!(resolution.applied.id, "x");
        assert!(matches!(resolution.reason, ApplyReason::ApplyRecord { .. }));
    }

    #[test]
    fn test_unknown_apply_record_falls_through() {
        let (result, sink) = run(
            vec![def("x", Level::Library, "a")],
            Some(apply_record("missing")),
            Default::default(),
        );
        assert_eq!(result.unwrap().applied.id, "x");
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_override_variable_beats_apply_record() {
        let (result, _) = run(
            vec![def("x", Level::Library, "a"), def("y", Level::Library, "b")],
            Some(apply_record("x")),
            ResolutionOverrides::default().with_apply(CONTRACT, "y"),
        );
        assert_eq!(result.unwrap().applied.id, "y");
    }

    #[test]
    fn test_deferred_apply_conflict_fatal_when_override_misses() {
        let conflict = ConflictError::ApplyDisagreement {
            contract: CONTRACT.into(),
            first_id: "x".into(),
            first: "a".into(),
            second_id: "y".into(),
            second: "b".into(),
        };
        let mut apply = apply_record("x");
        apply.conflict = Some(conflict.clone());

        let defs = vec![def("x", Level::Library, "a"), def("y", Level::Platform, "b")];
        let (missed, _) = run(
            defs.clone(),
            Some(apply.clone()),
            ResolutionOverrides::default().with_apply(CONTRACT, "z"),
        );
        assert_eq!(missed.unwrap_err(), conflict);

        let (hit, _) = run(
            defs,
            Some(apply),
            ResolutionOverrides::default().with_apply(CONTRACT, "x"),
        );
        assert_eq!(hit.unwrap().applied.id, "x");
    }
}
