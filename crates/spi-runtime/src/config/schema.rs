//! Settings schema definitions.
//!
//! These are the process-wide override variables: read once, injected into
//! the registry, never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use spi_core::{ResolutionOverrides, Verbosity};

/// Root settings structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiSettings {
    /// Loader diagnostics verbosity (error, info, debug).
    #[serde(
        default,
        serialize_with = "serialize_verbosity",
        deserialize_with = "deserialize_verbosity"
    )]
    pub verbosity: Verbosity,

    /// Whether the registry caches loaders.
    #[serde(default = "default_cache")]
    pub cache: bool,

    /// Fingerprints of resources to skip.
    ///
    /// Accepts a sequence or a comma-separated string.
    #[serde(default, deserialize_with = "deserialize_list")]
    pub file_exclusion: BTreeSet<String>,

    /// Service id to apply, by contract.
    ///
    /// Accepts a table or a `contract=id;contract=id` string.
    #[serde(default, deserialize_with = "deserialize_map")]
    pub apply: BTreeMap<String, String>,

    /// Comma-separated implementations to disable, by contract.
    ///
    /// Accepts a table or a `contract=a,b;contract=c` string.
    #[serde(default, deserialize_with = "deserialize_map")]
    pub ignore: BTreeMap<String, String>,

    /// Logging subscriber settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            cache: default_cache(),
            file_exclusion: BTreeSet::new(),
            apply: BTreeMap::new(),
            ignore: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SpiSettings {
    /// Returns the overrides consulted during resolution.
    ///
    /// Fingerprints are trimmed and lower-cased to match
    /// [`spi_core::fingerprint`].
    pub fn overrides(&self) -> ResolutionOverrides {
        ResolutionOverrides {
            apply: trimmed(&self.apply),
            ignore: trimmed(&self.ignore),
            file_exclusion: self
                .file_exclusion
                .iter()
                .map(|f| f.trim().to_ascii_lowercase())
                .collect(),
        }
    }
}

fn default_cache() -> bool {
    true
}

fn trimmed(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

// =============================================================================
// Lenient Field Formats
// =============================================================================

fn serialize_verbosity<S: Serializer>(value: &Verbosity, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_str())
}

fn deserialize_verbosity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Verbosity, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(de::Error::custom)
}

/// Env values made only of digits arrive as integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Signed(n) => n.to_string(),
            Self::Unsigned(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrText {
    List(Vec<Scalar>),
    Text(Scalar),
}

fn deserialize_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
    let items: Vec<String> = match ListOrText::deserialize(deserializer)? {
        ListOrText::List(items) => items.into_iter().map(Scalar::into_text).collect(),
        ListOrText::Text(text) => text.into_text().split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrText {
    Map(BTreeMap<String, String>),
    Text(String),
}

fn deserialize_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    match MapOrText::deserialize(deserializer)? {
        MapOrText::Map(map) => Ok(map),
        MapOrText::Text(text) => parse_pairs(&text).map_err(de::Error::custom),
    }
}

/// Parses `key=value;key=value`.
pub(crate) fn parse_pairs(text: &str) -> Result<BTreeMap<String, String>, String> {
    let mut map = BTreeMap::new();
    for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected 'contract=value', got '{pair}'"))?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

// =============================================================================
// Logging
// =============================================================================

/// Log level of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and errors.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Returns the level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line, every field.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// Newline-delimited JSON.
    #[cfg(feature = "json-log")]
    Json,
}

/// Destination of log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// The file at `file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    /// Span creation.
    #[serde(default)]
    pub new: bool,
    /// Span close.
    #[serde(default)]
    pub close: bool,
}

/// Logging subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Span lifecycle events, e.g. around loader construction.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module level overrides.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: BTreeMap::new(),
        }
    }
}
