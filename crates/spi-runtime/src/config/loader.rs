//! Settings loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML settings files (`spi.toml`)
//! - `yaml-config`: enables YAML settings files (`spi.yaml`, `spi.yml`)
//!
//! # Settings Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic base settings ([`SettingsLoader::merge`])
//! 3. Settings file (`spi.toml` / `spi.yaml`)
//! 4. Environment variables (`SPI_*`)
//! 5. Programmatic overrides ([`SettingsLoader::set`])
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `SPI_` prefix with `__` as separator:
//!
//! - `SPI_VERBOSITY=debug` → `verbosity = "debug"`
//! - `SPI_CACHE=false` → `cache = false`
//! - `SPI_FILE_EXCLUSION=ab12..,cd34..` → `file_exclusion = ["ab12..", "cd34.."]`
//! - `SPI_APPLY="demo.Greeter=english"` → `apply = { "demo.Greeter" = "english" }`
//! - `SPI_IGNORE="demo.Filter=a,b;demo.Sink=c"` → two ignore entries
//! - `SPI_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! Contract names contain dots and mixed case, so the map-valued variables
//! take a `contract=value;contract=value` string instead of nested keys.
//!
//! # Example
//!
//! ```rust,ignore
//! use spi_runtime::config::SettingsLoader;
//!
//! let settings = SettingsLoader::new().load()?;
//!
//! let settings = SettingsLoader::new()
//!     .file("./deploy/spi.toml")
//!     .set("cache", false)
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, trace};

use super::error::{SettingsError, SettingsResult};
use super::schema::SpiSettings;
use super::validation::validate_settings;

/// Prefix of the environment variables read by default.
pub const ENV_PREFIX: &str = "SPI_";

/// Settings loader with figment-based multi-source support.
pub struct SettingsLoader {
    /// Programmatic base layer.
    figment: Figment,
    /// Programmatic overrides, merged last.
    overrides: Figment,
    /// Search paths for settings files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Environment variable prefix.
    env_prefix: String,
    /// Specific settings file to load (overrides search).
    settings_file: Option<PathBuf>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Creates a new settings loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            overrides: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            env_prefix: ENV_PREFIX.to_string(),
            settings_file: None,
        }
    }

    /// Adds a search path for settings files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("spi"))
        } else {
            self
        }
    }

    /// Sets a specific settings file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Replaces the environment variable prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Merges base settings programmatically; files and environment still
    /// override them.
    pub fn merge(mut self, settings: SpiSettings) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(settings));
        self
    }

    /// Sets one key path after every other source, e.g. `"logging.level"`.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads, validates and returns the settings.
    pub fn load(self) -> SettingsResult<SpiSettings> {
        let figment = self.build_figment()?;

        let settings: SpiSettings = figment.extract().map_err(|e| {
            SettingsError::ParseError(format!("Failed to extract settings: {e}"))
        })?;
        validate_settings(&settings)?;

        debug!(
            verbosity = %settings.verbosity,
            cache = settings.cache,
            exclusions = settings.file_exclusion.len(),
            "Settings loaded successfully"
        );

        Ok(settings)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> SettingsResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SpiSettings::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = self.settings_file.take() {
            if path.exists() {
                info!(path = %path.display(), "Loading settings file");
                figment = Self::merge_settings_file(figment, &path)?;
            } else {
                return Err(SettingsError::FileNotFound(path));
            }
        } else {
            figment = self.load_settings_files(figment);
        }

        if self.load_env {
            trace!(prefix = %self.env_prefix, "Loading environment variables");
            figment = figment.merge(Env::prefixed(&self.env_prefix).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges a single settings file into the figment, dispatching on file extension.
    fn merge_settings_file(figment: Figment, path: &Path) -> SettingsResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(SettingsError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("spi"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Merges the first settings file found in the search paths.
    fn load_settings_files(&self, figment: Figment) -> Figment {
        let mut candidates: Vec<&str> = Vec::new();
        #[cfg(feature = "toml-config")]
        candidates.push("spi.toml");
        #[cfg(feature = "yaml-config")]
        candidates.extend(["spi.yaml", "spi.yml"]);

        for search_path in self.resolve_search_paths() {
            for name in &candidates {
                let path = search_path.join(name);
                if path.is_file() {
                    info!(path = %path.display(), "Loading settings file");
                    return Self::merge_settings_file(figment.clone(), &path).unwrap_or(figment);
                }
            }
        }

        debug!("No settings file found, using defaults");
        figment
    }
}

/// Loads settings from the default locations and the environment.
pub fn load_settings() -> SettingsResult<SpiSettings> {
    SettingsLoader::new().load()
}

/// Loads settings from `path` and the environment.
pub fn load_settings_from_file<P: AsRef<Path>>(path: P) -> SettingsResult<SpiSettings> {
    SettingsLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
