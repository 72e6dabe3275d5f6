//! The loader: resolved tables of one config root plus instantiation.
//!
//! A loader is built once, from start to finish, and never mutated. Decisions
//! are cached in the loader; objects are not. Every `load_*` call constructs
//! fresh instances.

use std::fmt;
use std::sync::Arc;

use spi_core::{
    Contract, DiagnosticSink, Diagnostics, FactoryRegistry, InstantiationContext,
    InstantiationError, LOGGER_CONFIG_ROOT, MAX_INFO_PLUGIN_LINES, PluginResolution,
    ResolutionOverrides, ResolvedConfig, ResourceEnumerator, ServiceResolution, SpiResult,
    Verbosity, normalize_root,
};
use tracing::info_span;

/// Identity of a cached loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderKey {
    /// Module-resolution context of the enumerator.
    pub context_id: String,
    /// Normalised config root.
    pub config_root: String,
}

impl LoaderKey {
    /// Creates a key, normalising `config_root`.
    pub fn new(context_id: impl Into<String>, config_root: &str) -> Self {
        Self {
            context_id: context_id.into(),
            config_root: normalize_root(config_root),
        }
    }
}

impl fmt::Display for LoaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.context_id, self.config_root)
    }
}

/// Inputs shared by every loader a registry builds.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Resolution overrides derived from settings.
    pub overrides: Arc<ResolutionOverrides>,
    /// Diagnostics verbosity.
    pub verbosity: Verbosity,
    /// Registered constructors.
    pub factories: Arc<FactoryRegistry>,
}

/// Fully resolved, immutable view of one config root.
pub struct Loader {
    id: usize,
    key: LoaderKey,
    resolved: ResolvedConfig,
    enumerator: Arc<dyn ResourceEnumerator>,
    factories: Arc<FactoryRegistry>,
    diagnostics: Diagnostics,
}

impl Loader {
    /// Parses and resolves `config_root` as seen through `enumerator`.
    ///
    /// Before that, services below [`LOGGER_CONFIG_ROOT`] are resolved; if a
    /// `spi.DiagnosticSink` is applied there, it replaces the default sink.
    pub fn build(
        id: usize,
        enumerator: Arc<dyn ResourceEnumerator>,
        config_root: &str,
        options: &LoaderOptions,
    ) -> SpiResult<Self> {
        let key = LoaderKey::new(enumerator.context_id(), config_root);
        let span = info_span!("spi_loader", loader_id = id, key = %key);
        let _guard = span.enter();

        let mut diagnostics = Diagnostics::tracing(id, options.verbosity);
        if key.config_root != LOGGER_CONFIG_ROOT {
            let sink = load_sink(id, enumerator.as_ref(), options)
                .inspect_err(|e| diagnostics.error(format!("Diagnostic sink failed: {e}")))?;
            if let Some(sink) = sink {
                diagnostics = diagnostics.with_sink(sink);
            }
        }

        diagnostics.debug(format!("Loader {id} building {key}"));
        let resolved = ResolvedConfig::load(
            enumerator.as_ref(),
            &key.config_root,
            &options.overrides,
            &diagnostics,
        )
        .inspect_err(|e| diagnostics.error(format!("Loader {id} failed on {key}: {e}")))?;
        diagnostics.info(format!(
            "Loader {id} ready: {} service contract(s), {} plugin contract(s), from {key}",
            resolved.services.len(),
            resolved.plugins.len(),
        ));

        Ok(Self {
            id,
            key,
            resolved,
            enumerator,
            factories: Arc::clone(&options.factories),
            diagnostics,
        })
    }

    /// Returns the loader id, unique within its registry.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the loader identity.
    pub fn key(&self) -> &LoaderKey {
        &self.key
    }

    /// Returns the normalised config root.
    pub fn config_root(&self) -> &str {
        &self.key.config_root
    }

    /// Returns both resolved tables.
    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    /// Returns the diagnostics handle.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Returns the resolution of a service contract.
    pub fn service_resolution(&self, contract: &str) -> Option<&ServiceResolution> {
        self.resolved.service(contract)
    }

    /// Returns the resolution of a plugin contract.
    pub fn plugin_resolution(&self, contract: &str) -> Option<&PluginResolution> {
        self.resolved.plugin(contract)
    }

    /// Constructs the applied service of `T`, or `None` if `T` has no
    /// definitions.
    pub fn load_service<T: ?Sized + Contract>(&self) -> SpiResult<Option<Box<T>>> {
        let Some(resolution) = self.resolved.service(T::NAME) else {
            self.diagnostics
                .debug(format!("No service definitions for {}", T::NAME));
            return Ok(None);
        };
        let applied = &resolution.applied;
        let object = self
            .context()
            .instantiate::<T>(&applied.implementation, &applied.config_root, &applied.source)
            .inspect_err(|e| self.report_failure(T::NAME, e))?;
        self.diagnostics
            .info(format!("Service loaded: {} => {applied}", T::NAME));
        Ok(Some(object))
    }

    /// Constructs every enabled plugin of `T` in priority order.
    ///
    /// One failing implementation fails the whole call.
    pub fn load_plugins<T: ?Sized + Contract>(&self) -> SpiResult<Vec<Box<T>>> {
        let Some(resolution) = self.resolved.plugin(T::NAME) else {
            self.diagnostics
                .debug(format!("No plugin definitions for {}", T::NAME));
            return Ok(Vec::new());
        };
        let context = self.context();
        let plugins = resolution
            .ordered
            .iter()
            .map(|definition| {
                context.instantiate::<T>(
                    &definition.implementation,
                    &definition.config_root,
                    &definition.source,
                )
            })
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| self.report_failure(T::NAME, e))?;

        for definition in resolution.ordered.iter().take(MAX_INFO_PLUGIN_LINES) {
            self.diagnostics
                .info(format!("Plugin loaded: {} => {definition}", T::NAME));
        }
        let rest = plugins.len().saturating_sub(MAX_INFO_PLUGIN_LINES);
        if rest > 0 {
            self.diagnostics
                .info(format!("Plugin loaded: {} => ... {rest} more", T::NAME));
        }
        Ok(plugins)
    }

    fn report_failure(&self, contract: &str, error: &InstantiationError) {
        self.diagnostics
            .error(format!("Failed to load {contract}: {error}"));
    }

    fn context(&self) -> InstantiationContext<'_> {
        InstantiationContext {
            enumerator: self.enumerator.as_ref(),
            factories: &self.factories,
            diagnostics: &self.diagnostics,
        }
    }
}

/// Resolves and builds the custom diagnostic sink, if one is configured.
///
/// Progress of this pass is only reported at `debug` verbosity.
fn load_sink(
    id: usize,
    enumerator: &dyn ResourceEnumerator,
    options: &LoaderOptions,
) -> SpiResult<Option<Arc<dyn DiagnosticSink>>> {
    let verbosity = match options.verbosity {
        Verbosity::Debug => Verbosity::Debug,
        _ => Verbosity::Error,
    };
    let bootstrap = Diagnostics::tracing(id, verbosity);
    let resolved = ResolvedConfig::load(
        enumerator,
        LOGGER_CONFIG_ROOT,
        &options.overrides,
        &bootstrap,
    )?;

    let Some(resolution) = resolved.service(<dyn DiagnosticSink as Contract>::NAME) else {
        return Ok(None);
    };
    let applied = &resolution.applied;
    let context = InstantiationContext {
        enumerator,
        factories: &options.factories,
        diagnostics: &bootstrap,
    };
    let sink = context.instantiate::<dyn DiagnosticSink>(
        &applied.implementation,
        &applied.config_root,
        &applied.source,
    )?;
    bootstrap.debug(format!("Diagnostic sink applied: {applied}"));
    Ok(Some(Arc::from(sink)))
}

/// Loaders are equal when they share an identity and resolved tables.
impl PartialEq for Loader {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.resolved == other.resolved
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("services", &self.resolved.services.len())
            .field("plugins", &self.resolved.plugins.len())
            .finish_non_exhaustive()
    }
}
