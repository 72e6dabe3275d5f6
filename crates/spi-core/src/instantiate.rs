//! Instantiation protocol.
//!
//! Turns a resolved [`Implementation`] into a boxed contract object:
//!
//! 1. Exactly one constructor must be registered under the implementation name.
//! 2. The constructor shape decides what it receives: nothing, the argument
//!    text, or a [`Parameters`] set loaded from `parameter/<arg>` in the
//!    **same resource group** as the declaring resource.
//! 3. The result must downcast to the requested contract.
//!
//! Nothing is memoized; every call builds a fresh object.

use std::collections::BTreeMap;

use crate::definition::Implementation;
use crate::diagnostics::Diagnostics;
use crate::error::{InstantiationError, InstantiationResult};
use crate::factory::{Constructor, Contract, FactoryRegistry};
use crate::parse::PARAMETER_DIR;
use crate::properties::Properties;
use crate::resource::{ResourceEnumerator, ResourceRef};

/// Key/value set handed to a parameters constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: BTreeMap<String, String>,
    location: Option<ResourceRef>,
}

impl Parameters {
    /// Creates an empty set with no location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from parsed properties loaded from `location`.
    pub fn from_properties(properties: &Properties, location: ResourceRef) -> Self {
        Self {
            values: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            location: Some(location),
        }
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value for `key`, or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Iterates over the pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the location of the parameter resource, if one was loaded.
    pub fn location(&self) -> Option<&ResourceRef> {
        self.location.as_ref()
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            location: None,
        }
    }
}

/// Everything instantiation needs besides the implementation itself.
#[derive(Clone, Copy)]
pub struct InstantiationContext<'a> {
    /// Enumerator used to find parameter resources.
    pub enumerator: &'a dyn ResourceEnumerator,
    /// Registered constructors.
    pub factories: &'a FactoryRegistry,
    /// Diagnostics of the owning loader.
    pub diagnostics: &'a Diagnostics,
}

impl InstantiationContext<'_> {
    /// Builds `implementation` as a `T`.
    ///
    /// `config_root` and `source` describe where the implementation was
    /// declared; parameter resources are only accepted from the same group.
    pub fn instantiate<T: ?Sized + Contract>(
        &self,
        implementation: &Implementation,
        config_root: &str,
        source: &ResourceRef,
    ) -> InstantiationResult<Box<T>> {
        let name = implementation.name.as_str();
        let entry = match self.factories.lookup(name) {
            [] => {
                return Err(InstantiationError::NotRegistered {
                    implementation: name.to_string(),
                    resource: source.to_string(),
                });
            }
            [entry] => *entry,
            entries => {
                return Err(InstantiationError::MultipleConstructors {
                    implementation: name.to_string(),
                    count: entries.len(),
                    resource: source.to_string(),
                });
            }
        };

        let arg = implementation.arg.as_deref();
        let constructed = match entry.constructor {
            Constructor::Empty(construct) => construct(),
            Constructor::Text(construct) => construct(arg),
            Constructor::Parameters(construct) => {
                let parameters = self.load_parameters(implementation, config_root, source)?;
                construct(parameters)
            }
        };

        let instance = constructed.map_err(|source_err| InstantiationError::Failed {
            implementation: name.to_string(),
            resource: source.to_string(),
            source: source_err,
        })?;

        instance
            .downcast::<T>()
            .map_err(|_| InstantiationError::TypeMismatch {
                implementation: name.to_string(),
                contract: T::NAME.to_string(),
                resource: source.to_string(),
            })
    }

    /// Loads `parameter/<arg>` from the declaring resource's group.
    fn load_parameters(
        &self,
        implementation: &Implementation,
        config_root: &str,
        source: &ResourceRef,
    ) -> InstantiationResult<Parameters> {
        let name = implementation.name.as_str();
        let Some(arg) = implementation.arg.as_deref().filter(|a| !a.trim().is_empty()) else {
            self.diagnostics.debug(format!(
                "{name} takes parameters but declares no parameter file, passing an empty set, declared in {source}"
            ));
            return Ok(Parameters::new());
        };

        let arg = arg.trim();
        if !stays_in_group(arg) {
            return Err(InstantiationError::InvalidParameterPath {
                implementation: name.to_string(),
                arg: arg.to_string(),
                resource: source.to_string(),
            });
        }

        let relative = format!("{PARAMETER_DIR}{arg}");
        let path = format!("{config_root}{relative}");
        let prefix = source.group_prefix();

        let candidates =
            self.enumerator
                .enumerate(&path)
                .map_err(|e| InstantiationError::ParameterIo {
                    implementation: name.to_string(),
                    path: path.clone(),
                    resource: source.to_string(),
                    source: e,
                })?;

        let resource = candidates
            .into_iter()
            .find(|r| r.location().as_str().starts_with(prefix))
            .ok_or_else(|| InstantiationError::MissingParameters {
                implementation: name.to_string(),
                expected: format!("{prefix}{relative}"),
                resource: source.to_string(),
            })?;

        let properties = Properties::from_bytes(resource.bytes(), resource.location().as_str())
            .map_err(|e| InstantiationError::InvalidParameters {
                implementation: name.to_string(),
                resource: source.to_string(),
                source: e,
            })?;

        let parameters = Parameters::from_properties(&properties, resource.location().clone());
        self.diagnostics.info(format!(
            "Parameters loaded for {implementation}: {} entries",
            parameters.len()
        ));
        self.diagnostics
            .debug(format!("Parameters of {implementation} read from {}", resource.location()));
        Ok(parameters)
    }
}

/// A parameter argument may not be absolute or contain `..` segments.
fn stays_in_group(arg: &str) -> bool {
    !arg.starts_with(['/', '\\']) && !arg.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::factory::{ConstructResult, ImplementationEntry, Instance};
    use crate::resource::EmbeddedEnumerator;

    trait Endpoint {
        fn describe(&self) -> String;
    }

    impl Contract for dyn Endpoint {
        const NAME: &'static str = "test.Endpoint";
    }

    trait Unrelated {}

    impl Contract for dyn Unrelated {
        const NAME: &'static str = "test.Unrelated";
    }

    impl std::fmt::Debug for dyn Endpoint {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Endpoint")
        }
    }

    impl std::fmt::Debug for dyn Unrelated {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Unrelated")
        }
    }

    struct Fixed(String);

    impl Endpoint for Fixed {
        fn describe(&self) -> String {
            self.0.clone()
        }
    }

    fn boxed(text: String) -> ConstructResult {
        let object: Box<dyn Endpoint> = Box::new(Fixed(text));
        Ok(Instance::new(object))
    }

    fn empty() -> ConstructResult {
        boxed("empty".into())
    }

    fn text(arg: Option<&str>) -> ConstructResult {
        boxed(format!("text:{}", arg.unwrap_or("<none>")))
    }

    fn params(parameters: Parameters) -> ConstructResult {
        boxed(format!(
            "url={} from={}",
            parameters.get_or("url", "?"),
            parameters.location().map(|l| l.to_string()).unwrap_or_default()
        ))
    }

    fn failing() -> ConstructResult {
        Err(BoxError::from("refused"))
    }

    fn entry(name: &'static str, constructor: Constructor) -> ImplementationEntry {
        ImplementationEntry {
            name,
            contract: <dyn Endpoint as Contract>::NAME,
            constructor,
        }
    }

    fn registry() -> FactoryRegistry {
        FactoryRegistry::new()
            .with(entry("test.Empty", Constructor::Empty(empty)))
            .with(entry("test.Text", Constructor::Text(text)))
            .with(entry("test.Params", Constructor::Parameters(params)))
            .with(entry("test.Failing", Constructor::Empty(failing)))
            .with(entry("test.Twice", Constructor::Empty(empty)))
            .with(entry("test.Twice", Constructor::Text(text)))
    }

    fn enumerator() -> EmbeddedEnumerator {
        EmbeddedEnumerator::new("test")
            .with("a", "META-INF/spi/parameter/remote.properties", "url=http://a\n")
            .with("b", "META-INF/spi/parameter/remote.properties", "url=http://b\n")
    }

    fn build<T: ?Sized + Contract>(
        implementation: Implementation,
        module: &str,
    ) -> InstantiationResult<Box<T>> {
        let enumerator = enumerator();
        let factories = registry();
        let diagnostics = Diagnostics::tracing(0, crate::diagnostics::Verbosity::Debug);
        let ctx = InstantiationContext {
            enumerator: &enumerator,
            factories: &factories,
            diagnostics: &diagnostics,
        };
        let source = ResourceRef::new(format!("embedded:{module}/META-INF/spi/service.properties"));
        ctx.instantiate::<T>(&implementation, "META-INF/spi/", &source)
    }

    #[test]
    fn test_empty_constructor_ignores_arg() {
        let endpoint = build::<dyn Endpoint>(Implementation::with_arg("test.Empty", "x"), "a").unwrap();
        assert_eq!(endpoint.describe(), "empty");
    }

    #[test]
    fn test_text_constructor_receives_arg_verbatim() {
        let endpoint =
            build::<dyn Endpoint>(Implementation::with_arg("test.Text", " spaced "), "a").unwrap();
        assert_eq!(endpoint.describe(), "text: spaced ");

        let endpoint = build::<dyn Endpoint>(Implementation::new("test.Text"), "a").unwrap();
        assert_eq!(endpoint.describe(), "text:<none>");
    }

    #[test]
    fn test_parameters_come_from_same_group() {
        let endpoint = build::<dyn Endpoint>(
            Implementation::with_arg("test.Params", "remote.properties"),
            "b",
        )
        .unwrap();
        assert_eq!(
            endpoint.describe(),
            "url=http://b from=embedded:b/META-INF/spi/parameter/remote.properties"
        );
    }

    #[test]
    fn test_parameters_missing_in_group() {
        let err = build::<dyn Endpoint>(
            Implementation::with_arg("test.Params", "remote.properties"),
            "c",
        )
        .unwrap_err();
        match err {
            InstantiationError::MissingParameters { expected, resource, .. } => {
                assert_eq!(expected, "embedded:c/META-INF/spi/parameter/remote.properties");
                assert_eq!(resource, "embedded:c/META-INF/spi/service.properties");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parameter_path_cannot_leave_group() {
        let escaping = [
            "../../../b/META-INF/spi/parameter/remote.properties",
            "/etc/remote.properties",
            "x/../../remote.properties",
        ];
        for arg in escaping {
            let err = build::<dyn Endpoint>(Implementation::with_arg("test.Params", arg), "a")
                .unwrap_err();
            match err {
                InstantiationError::InvalidParameterPath { arg: rejected, resource, .. } => {
                    assert_eq!(rejected, arg);
                    assert_eq!(resource, "embedded:a/META-INF/spi/service.properties");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert!(stays_in_group("nested/remote.properties"));
        assert!(stays_in_group("remote..properties"));
    }

    #[test]
    fn test_parameters_without_arg_are_empty() {
        let endpoint = build::<dyn Endpoint>(Implementation::new("test.Params"), "a").unwrap();
        assert_eq!(endpoint.describe(), "url=? from=");
    }

    #[test]
    fn test_not_registered() {
        let err = build::<dyn Endpoint>(Implementation::new("test.Missing"), "a").unwrap_err();
        assert!(matches!(err, InstantiationError::NotRegistered { .. }));
    }

    #[test]
    fn test_multiple_constructors() {
        let err = build::<dyn Endpoint>(Implementation::new("test.Twice"), "a").unwrap_err();
        assert!(matches!(err, InstantiationError::MultipleConstructors { count: 2, .. }));
    }

    #[test]
    fn test_constructor_failure() {
        let err = build::<dyn Endpoint>(Implementation::new("test.Failing"), "a").unwrap_err();
        assert!(matches!(err, InstantiationError::Failed { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let err = build::<dyn Unrelated>(Implementation::new("test.Empty"), "a").unwrap_err();
        match err {
            InstantiationError::TypeMismatch { contract, .. } => {
                assert_eq!(contract, "test.Unrelated");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
