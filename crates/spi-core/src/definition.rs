//! Typed records parsed from configuration resources.

use std::fmt;

use crate::error::{SyntaxError, SyntaxResult};
use crate::resource::ResourceRef;

/// Key shape of a service definition.
pub const SERVICE_KEY_FORMAT: &str = "interface>id>level=impl";
/// Key shape of a plugin definition.
pub const PLUGIN_KEY_FORMAT: &str = "interface>priority=impl";

// =============================================================================
// Level
// =============================================================================

/// Coarse tie-break rank of a service definition. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Built-in fallback.
    Default,
    /// Open-source extension library.
    Library,
    /// The integrating platform framework.
    Platform,
    /// The final application.
    Application,
}

impl Level {
    /// Parses a level name, case-insensitively.
    ///
    /// Returns `None` for unknown names; callers treat that as a syntax error.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "library" => Some(Self::Library),
            "platform" => Some(Self::Platform),
            "application" => Some(Self::Application),
            _ => None,
        }
    }

    /// Returns the level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Library => "library",
            Self::Platform => "platform",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Implementation
// =============================================================================

/// An implementation reference: a registered name plus an optional
/// constructor argument, written `name` or `name(arg)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Implementation {
    /// Registered implementation name.
    pub name: String,
    /// Constructor argument between the parentheses, if any.
    pub arg: Option<String>,
}

impl Implementation {
    /// Creates a reference without a constructor argument.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg: None,
        }
    }

    /// Creates a reference with a constructor argument.
    pub fn with_arg(name: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg: Some(arg.into()),
        }
    }

    /// Parses `name` or `name(arg)`.
    ///
    /// `key` and `origin` only feed the error message; `origin` is the
    /// resource location or the override variable the value came from.
    pub fn parse(value: &str, key: &str, origin: &str) -> SyntaxResult<Self> {
        let value = value.trim();
        match value.find('(') {
            Some(0) => Err(SyntaxError::MissingImplementation {
                key: key.to_string(),
                resource: origin.to_string(),
            }),
            Some(start) => {
                if !value.ends_with(')') {
                    return Err(SyntaxError::UnterminatedArgument {
                        key: key.to_string(),
                        resource: origin.to_string(),
                    });
                }
                Ok(Self::with_arg(
                    value[..start].trim(),
                    &value[start + 1..value.len() - 1],
                ))
            }
            None => Ok(Self::new(value)),
        }
    }

    /// Returns `true` if `other` is selected by this reference.
    ///
    /// A reference without an argument selects every definition of the same
    /// name; a reference with an argument selects only an exact match.
    pub fn selects(&self, other: &Implementation) -> bool {
        self.name == other.name && (self.arg.is_none() || self.arg == other.arg)
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({})", self.name, arg),
            None => f.write_str(&self.name),
        }
    }
}

// =============================================================================
// ServiceDefinition
// =============================================================================

/// One `interface>id>level=impl` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Service contract name.
    pub contract: String,
    /// Id, unique per contract across all merged resources.
    pub id: String,
    /// Tie-break level.
    pub level: Level,
    /// Implementation reference.
    pub implementation: Implementation,
    /// Config root the resource was found under.
    pub config_root: String,
    /// Resource that declared this definition.
    pub source: ResourceRef,
}

impl ServiceDefinition {
    /// Parses one service entry from `source`.
    pub fn from_entry(
        key: &str,
        value: &str,
        config_root: &str,
        source: &ResourceRef,
    ) -> SyntaxResult<Self> {
        let key = key.trim();
        let parts: Vec<&str> = key.split('>').collect();
        let [contract, id, level] = parts.as_slice() else {
            return Err(SyntaxError::IllegalKey {
                key: key.to_string(),
                expected: SERVICE_KEY_FORMAT,
                resource: source.to_string(),
            });
        };

        let level_text = level.trim();
        let level = Level::parse(level_text).ok_or_else(|| SyntaxError::UndefinedLevel {
            level: level_text.to_string(),
            key: key.to_string(),
            resource: source.to_string(),
        })?;

        Ok(Self {
            contract: contract.trim().to_string(),
            id: id.trim().to_string(),
            level,
            implementation: parse_value(key, value, source)?,
            config_root: config_root.to_string(),
            source: source.clone(),
        })
    }

    /// Renders this definition back to its key/value form.
    pub fn to_entry(&self) -> (String, String) {
        (
            format!("{}>{}>{}", self.contract, self.id, self.level),
            self.implementation.to_string(),
        )
    }
}

impl fmt::Display for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Service{{id={}, level={}, impl={}, resource={}}}",
            self.id, self.level, self.implementation, self.source
        )
    }
}

// =============================================================================
// ApplyOverride
// =============================================================================

/// A `service-apply` record pinning a contract to an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOverride {
    /// Service contract name.
    pub contract: String,
    /// Id the record selects.
    pub chosen_id: String,
    /// Resource that declared the record.
    pub source: ResourceRef,
    /// Disagreement with another record, tolerated at parse time because an
    /// override variable is set for the contract.
    pub conflict: Option<crate::error::ConflictError>,
}

// =============================================================================
// PluginDefinition
// =============================================================================

/// One `interface>priority=impl` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDefinition {
    /// Plugin contract name.
    pub contract: String,
    /// Ordering key, ascending.
    pub priority: i32,
    /// Implementation reference.
    pub implementation: Implementation,
    /// Config root the resource was found under.
    pub config_root: String,
    /// Resource that declared this definition.
    pub source: ResourceRef,
    /// Cleared by ignore rules.
    pub enabled: bool,
    /// Last rule that disabled the definition.
    pub disable_reason: Option<String>,
}

impl PluginDefinition {
    /// Parses one plugin entry from `source`.
    pub fn from_entry(
        key: &str,
        value: &str,
        config_root: &str,
        source: &ResourceRef,
    ) -> SyntaxResult<Self> {
        let key = key.trim();
        let parts: Vec<&str> = key.split('>').collect();
        let [contract, priority] = parts.as_slice() else {
            return Err(SyntaxError::IllegalKey {
                key: key.to_string(),
                expected: PLUGIN_KEY_FORMAT,
                resource: source.to_string(),
            });
        };

        let priority_text = priority.trim();
        let priority = priority_text
            .parse::<i32>()
            .map_err(|_| SyntaxError::InvalidPriority {
                priority: priority_text.to_string(),
                key: key.to_string(),
                resource: source.to_string(),
            })?;

        Ok(Self {
            contract: contract.trim().to_string(),
            priority,
            implementation: parse_value(key, value, source)?,
            config_root: config_root.to_string(),
            source: source.clone(),
            enabled: true,
            disable_reason: None,
        })
    }

    /// Renders this definition back to its key/value form.
    pub fn to_entry(&self) -> (String, String) {
        (
            format!("{}>{}", self.contract, self.priority),
            self.implementation.to_string(),
        )
    }
}

impl fmt::Display for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plugin{{priority={}, impl={}", self.priority, self.implementation)?;
        if let Some(reason) = self.disable_reason.as_deref().filter(|_| !self.enabled) {
            write!(f, ", disabled by {reason}")?;
        }
        write!(f, ", resource={}}}", self.source)
    }
}

// =============================================================================
// IgnoreRule
// =============================================================================

/// Disables plugin definitions of one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRule {
    /// Plugin contract name.
    pub contract: String,
    /// Implementation to disable; an argument narrows the match.
    pub ignored: Implementation,
    /// Resource (or override variable) that declared the rule.
    pub source: ResourceRef,
}

/// Parses a non-blank implementation value.
fn parse_value(key: &str, value: &str, source: &ResourceRef) -> SyntaxResult<Implementation> {
    if value.trim().is_empty() {
        return Err(SyntaxError::EmptyValue {
            key: key.to_string(),
            resource: source.to_string(),
        });
    }
    Implementation::parse(value, key, source.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> ResourceRef {
        ResourceRef::new("embedded:a/META-INF/spi/service.properties")
    }

    #[test]
    fn test_level_ordering_and_parse() {
        assert!(Level::Application > Level::Platform);
        assert!(Level::Platform > Level::Library);
        assert!(Level::Library > Level::Default);
        assert_eq!(Level::parse("PLATFORM"), Some(Level::Platform));
        assert_eq!(Level::parse("vendor"), None);
    }

    #[test]
    fn test_implementation_parse() {
        let plain = Implementation::parse("demo.Impl", "k", "r").unwrap();
        assert_eq!(plain, Implementation::new("demo.Impl"));

        let with_arg = Implementation::parse("demo.Impl (a, b)", "k", "r").unwrap();
        assert_eq!(with_arg, Implementation::with_arg("demo.Impl", "a, b"));

        let empty_arg = Implementation::parse("demo.Impl()", "k", "r").unwrap();
        assert_eq!(empty_arg.arg.as_deref(), Some(""));
    }

    #[test]
    fn test_implementation_parse_errors() {
        assert!(matches!(
            Implementation::parse("(arg)", "k", "r"),
            Err(SyntaxError::MissingImplementation { .. })
        ));
        assert!(matches!(
            Implementation::parse("demo.Impl(arg", "k", "r"),
            Err(SyntaxError::UnterminatedArgument { .. })
        ));
    }

    #[test]
    fn test_implementation_selects() {
        let a = Implementation::with_arg("demo.Impl", "a");
        let b = Implementation::with_arg("demo.Impl", "b");
        assert!(Implementation::new("demo.Impl").selects(&a));
        assert!(a.selects(&a));
        assert!(!a.selects(&b));
        assert!(!Implementation::new("demo.Other").selects(&a));
    }

    #[test]
    fn test_service_from_entry() {
        let def = ServiceDefinition::from_entry(
            " demo.Greeter > english > Library ",
            "demo.English(hello)",
            "META-INF/spi/",
            &source(),
        )
        .unwrap();
        assert_eq!(def.contract, "demo.Greeter");
        assert_eq!(def.id, "english");
        assert_eq!(def.level, Level::Library);
        assert_eq!(def.implementation, Implementation::with_arg("demo.English", "hello"));
    }

    #[test]
    fn test_service_from_entry_errors() {
        let bad_key = ServiceDefinition::from_entry("demo.Greeter>english", "x", "", &source());
        assert!(matches!(bad_key, Err(SyntaxError::IllegalKey { .. })));

        let bad_level =
            ServiceDefinition::from_entry("demo.Greeter>english>vendor", "x", "", &source());
        assert!(matches!(bad_level, Err(SyntaxError::UndefinedLevel { .. })));

        let empty = ServiceDefinition::from_entry("demo.Greeter>english>library", "  ", "", &source());
        assert!(matches!(empty, Err(SyntaxError::EmptyValue { .. })));
    }

    #[test]
    fn test_service_entry_reparses() {
        let def = ServiceDefinition::from_entry(
            "demo.Greeter>english>platform",
            "demo.English(hi there)",
            "META-INF/spi/",
            &source(),
        )
        .unwrap();
        let (key, value) = def.to_entry();
        let other = ResourceRef::new("elsewhere");
        let reparsed = ServiceDefinition::from_entry(&key, &value, "META-INF/spi/", &other).unwrap();
        assert_eq!(ServiceDefinition { source: other, ..def }, reparsed);
    }

    #[test]
    fn test_plugin_from_entry() {
        let def = PluginDefinition::from_entry("demo.Filter>-5", "demo.A", "", &source()).unwrap();
        assert_eq!(def.priority, -5);
        assert!(def.enabled);

        let bad = PluginDefinition::from_entry("demo.Filter>high", "demo.A", "", &source());
        assert!(matches!(bad, Err(SyntaxError::InvalidPriority { .. })));

        let bad_key = PluginDefinition::from_entry("demo.Filter", "demo.A", "", &source());
        assert!(matches!(bad_key, Err(SyntaxError::IllegalKey { .. })));
    }
}
