//! Subscriber setup for processes embedding the spi runtime.
//!
//! Loader diagnostics go through `tracing` unless a custom diagnostic sink is
//! configured, so nothing is printed until a subscriber is installed.
//!
//! ```rust,ignore
//! use spi_runtime::config::load_settings;
//! use spi_runtime::logging;
//!
//! let settings = load_settings()?;
//! logging::init_from_settings(&settings);
//! ```
//!
//! At `debug` verbosity the engine crates are raised to `debug` as well, so
//! per-definition reports are not swallowed by an `info` base level.

use std::path::PathBuf;

use spi_core::Verbosity;
use tracing::warn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig, SpiSettings};

/// Crates whose level follows the loader verbosity.
const ENGINE_TARGETS: [&str; 2] = ["spi_core", "spi_runtime"];

/// File name used when the configured log path has none.
const DEFAULT_LOG_FILE: &str = "spi.log";

/// Which span lifecycle events are logged.
///
/// Every loader is built inside an `spi_loader` span; `close` reports how
/// long construction took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    /// Log when a span is created.
    pub new: bool,
    /// Log when a span is closed, with its busy/idle timings.
    pub close: bool,
}

impl SpanEvents {
    /// No span events.
    pub const NONE: Self = Self {
        new: false,
        close: false,
    };

    /// Span creation and close.
    pub const LIFECYCLE: Self = Self {
        new: true,
        close: true,
    };

    fn to_fmt_span(self) -> FmtSpan {
        match (self.new, self.close) {
            (true, true) => FmtSpan::NEW | FmtSpan::CLOSE,
            (true, false) => FmtSpan::NEW,
            (false, true) => FmtSpan::CLOSE,
            (false, false) => FmtSpan::NONE,
        }
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            close: config.close,
        }
    }
}

/// Installs a subscriber for `settings`; returns `false` if one was already set.
pub fn init_from_settings(settings: &SpiSettings) -> bool {
    LoggingBuilder::from_settings(settings).try_init().is_ok()
}

/// Installs a subscriber for `config`; returns `false` if one was already set.
pub fn init_from_config(config: &LoggingConfig) -> bool {
    LoggingBuilder::from_config(config).try_init().is_ok()
}

/// Builder for the global `tracing` subscriber.
///
/// ```rust,ignore
/// use spi_runtime::logging::{LoggingBuilder, SpanEvents};
///
/// LoggingBuilder::new()
///     .directive("spi_core=debug")
///     .span_events(SpanEvents::LIFECYCLE)
///     .init();
/// ```
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    directives: Vec<String>,
    span_events: SpanEvents,
    target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact output on stdout at `info`.
    pub fn new() -> Self {
        Self::from_config(&LoggingConfig::default())
    }

    /// Starts from a [`LoggingConfig`]; its filters become directives.
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            directives: config
                .filters
                .iter()
                .map(|(target, level)| format!("{target}={level}"))
                .collect(),
            span_events: SpanEvents::from(&config.span_events),
            config: config.clone(),
            target: true,
        }
    }

    /// Starts from the logging section of `settings` and lifts the engine
    /// crates to `debug` when the loader verbosity is `debug`.
    pub fn from_settings(settings: &SpiSettings) -> Self {
        let mut builder = Self::from_config(&settings.logging);
        if settings.verbosity == Verbosity::Debug {
            for target in ENGINE_TARGETS {
                builder = builder.directive(&format!("{target}=debug"));
            }
        }
        builder
    }

    /// Sets the base level.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a filter directive, e.g. `"spi_core=debug"`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Sets which span events are logged.
    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Sets the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Writes to stderr instead of stdout.
    pub fn stderr(mut self) -> Self {
        self.config.output = LogOutput::Stderr;
        self
    }

    /// Writes to `path`, never rotated.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.into());
        self
    }

    /// Includes thread ids.
    pub fn thread_ids(mut self, enabled: bool) -> Self {
        self.config.thread_ids = enabled;
        self
    }

    /// Includes file names and line numbers.
    pub fn file_location(mut self, enabled: bool) -> Self {
        self.config.file_location = enabled;
        self
    }

    /// Includes the event target.
    pub fn target(mut self, enabled: bool) -> Self {
        self.target = enabled;
        self
    }

    /// Installs the subscriber, ignoring an already installed one.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.filter();
        tracing_subscriber::registry()
            .with(self.layer())
            .with(filter)
            .try_init()
    }

    /// `RUST_LOG` replaces the base level; directives apply on top.
    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));
        for directive in &self.directives {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(e) => warn!(directive = %directive, error = %e, "Ignoring invalid log directive"),
            }
        }
        filter
    }

    fn writer(&self) -> BoxMakeWriter {
        match self.config.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File => {
                let Some(path) = &self.config.file_path else {
                    warn!("File output requested without a file path, writing to stdout");
                    return BoxMakeWriter::new(std::io::stdout);
                };
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let name = path
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| DEFAULT_LOG_FILE.into());
                BoxMakeWriter::new(tracing_appender::rolling::never(dir, name))
            }
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(self.writer())
            .with_span_events(self.span_events.to_fmt_span())
            .with_target(self.target)
            .with_thread_ids(self.config.thread_ids)
            .with_file(self.config.file_location)
            .with_line_number(self.config.file_location);

        match self.config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }
}
