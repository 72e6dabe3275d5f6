//! Build-time implementation registry.
//!
//! Implementations are not discovered by reflection. Each one registers a
//! single constructor function under its configured name, either with the
//! `#[implementation(...)]` attribute (which appends to the
//! [`IMPLEMENTATIONS`] distributed slice) or explicitly through
//! [`FactoryRegistry::with`].
//!
//! The constructor's signature fixes its [`Constructor`] shape at compile
//! time, so "exactly one constructor taking zero or one parameter" is checked
//! by the compiler rather than by a runtime scan.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use linkme::distributed_slice;

use crate::error::BoxError;
use crate::instantiate::Parameters;

/// Names a trait-object type as a service or plugin contract.
///
/// ```rust,ignore
/// pub trait Greeter: Send + Sync {
///     fn greet(&self, name: &str) -> String;
/// }
///
/// impl Contract for dyn Greeter {
///     const NAME: &'static str = "demo.Greeter";
/// }
/// ```
pub trait Contract: 'static {
    /// Contract name used as the interface part of configuration keys.
    const NAME: &'static str;
}

/// A constructed implementation, erased to its contract's boxed trait object.
///
/// The payload is a `Box<dyn Trait>`; [`Instance::downcast`] recovers it when
/// asked for the right contract.
pub struct Instance(Box<dyn Any>);

impl Instance {
    /// Wraps a boxed contract object.
    pub fn new<T: ?Sized + 'static>(object: Box<T>) -> Self {
        Self(Box::new(object))
    }

    /// Recovers the boxed contract object, or returns `self` if the instance
    /// was built for another contract.
    pub fn downcast<T: ?Sized + 'static>(self) -> Result<Box<T>, Self> {
        self.0.downcast::<Box<T>>().map(|boxed| *boxed).map_err(Self)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance").finish_non_exhaustive()
    }
}

/// Result of calling a constructor.
pub type ConstructResult = Result<Instance, BoxError>;

/// The single constructor of an implementation.
#[derive(Clone, Copy)]
pub enum Constructor {
    /// Takes no argument; any configured argument is ignored.
    Empty(fn() -> ConstructResult),
    /// Takes the configured argument verbatim.
    Text(fn(Option<&str>) -> ConstructResult),
    /// Takes the key/value set named by the configured argument.
    Parameters(fn(Parameters) -> ConstructResult),
}

impl Constructor {
    /// Short name of the constructor shape.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Empty(_) => "empty",
            Self::Text(_) => "text",
            Self::Parameters(_) => "parameters",
        }
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor::{}", self.shape())
    }
}

/// One registered implementation.
#[derive(Debug, Clone, Copy)]
pub struct ImplementationEntry {
    /// Name referenced by configuration values.
    pub name: &'static str,
    /// Contract the constructor produces.
    pub contract: &'static str,
    /// The constructor.
    pub constructor: Constructor,
}

/// Every implementation registered with `#[implementation(...)]`.
#[distributed_slice]
pub static IMPLEMENTATIONS: [ImplementationEntry];

/// Lookup table from implementation name to registered constructors.
#[derive(Debug, Clone, Default)]
pub struct FactoryRegistry {
    entries: HashMap<&'static str, Vec<ImplementationEntry>>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from every `#[implementation(...)]` in the binary.
    pub fn collect_all() -> Self {
        IMPLEMENTATIONS
            .iter()
            .copied()
            .fold(Self::new(), |registry, entry| registry.with(entry))
    }

    /// Adds an entry.
    pub fn with(mut self, entry: ImplementationEntry) -> Self {
        self.register(entry);
        self
    }

    /// Adds an entry.
    pub fn register(&mut self, entry: ImplementationEntry) {
        self.entries.entry(entry.name).or_default().push(entry);
    }

    /// Returns every constructor registered under `name`.
    pub fn lookup(&self, name: &str) -> &[ImplementationEntry] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the number of distinct implementation names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
