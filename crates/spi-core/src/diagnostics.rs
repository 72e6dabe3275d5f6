//! Loader diagnostics.
//!
//! Every loader reports what it found, what it applied and what it skipped
//! through a [`Diagnostics`] handle: a verbosity gate in front of a
//! [`DiagnosticSink`]. The default sink forwards to `tracing`; a loader may
//! replace it with a sink resolved from its own configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::factory::Contract;

/// How much a loader reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    /// Only fatal errors.
    Error,
    /// Applied services, loaded plugins and warnings.
    #[default]
    Info,
    /// Everything, including every definition and its source.
    Debug,
}

impl Verbosity {
    /// Returns the verbosity name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!(
                "unknown verbosity '{other}', expected error/info/debug"
            )),
        }
    }
}

/// Severity of one diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A fatal problem; always reported.
    Error,
    /// A lookup miss or other recoverable oddity.
    Warning,
    /// Normal progress.
    Info,
    /// Detailed progress.
    Debug,
}

/// One diagnostic message.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticRecord<'a> {
    /// Id of the loader that produced the message.
    pub loader_id: usize,
    /// Severity of the message.
    pub severity: Severity,
    /// The message text.
    pub message: &'a str,
}

/// Destination of loader diagnostics.
pub trait DiagnosticSink: Send + Sync + 'static {
    /// Receives one record that passed the verbosity gate.
    fn emit(&self, record: &DiagnosticRecord<'_>);
}

impl Contract for dyn DiagnosticSink {
    const NAME: &'static str = "spi.DiagnosticSink";
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, record: &DiagnosticRecord<'_>) {
        let loader_id = record.loader_id;
        match record.severity {
            Severity::Error => error!(loader_id, "{}", record.message),
            Severity::Warning => warn!(loader_id, "{}", record.message),
            Severity::Info => info!(loader_id, "{}", record.message),
            Severity::Debug => debug!(loader_id, "{}", record.message),
        }
    }
}

/// Verbosity-gated handle to a [`DiagnosticSink`].
#[derive(Clone)]
pub struct Diagnostics {
    loader_id: usize,
    verbosity: Verbosity,
    sink: Arc<dyn DiagnosticSink>,
}

impl Diagnostics {
    /// Creates a handle for `loader_id`.
    pub fn new(loader_id: usize, verbosity: Verbosity, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            loader_id,
            verbosity,
            sink,
        }
    }

    /// Creates a handle that forwards to `tracing`.
    pub fn tracing(loader_id: usize, verbosity: Verbosity) -> Self {
        Self::new(loader_id, verbosity, Arc::new(TracingSink))
    }

    /// Returns a copy with the verbosity replaced.
    pub fn with_verbosity(&self, verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            ..self.clone()
        }
    }

    /// Returns a copy with the sink replaced.
    pub fn with_sink(&self, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            ..self.clone()
        }
    }

    /// Returns the loader id.
    pub fn loader_id(&self) -> usize {
        self.loader_id
    }

    /// Returns the verbosity.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Returns `true` if messages at `verbosity` are reported.
    pub fn enabled(&self, verbosity: Verbosity) -> bool {
        self.verbosity >= verbosity
    }

    /// Reports a fatal problem.
    pub fn error(&self, message: impl fmt::Display) {
        self.emit(Severity::Error, message);
    }

    /// Reports a warning; shown from `info` verbosity.
    pub fn warn(&self, message: impl fmt::Display) {
        if self.enabled(Verbosity::Info) {
            self.emit(Severity::Warning, message);
        }
    }

    /// Reports progress; shown from `info` verbosity.
    pub fn info(&self, message: impl fmt::Display) {
        if self.enabled(Verbosity::Info) {
            self.emit(Severity::Info, message);
        }
    }

    /// Reports detail; shown at `debug` verbosity.
    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled(Verbosity::Debug) {
            self.emit(Severity::Debug, message);
        }
    }

    fn emit(&self, severity: Severity, message: impl fmt::Display) {
        let message = message.to_string();
        self.sink.emit(&DiagnosticRecord {
            loader_id: self.loader_id,
            severity,
            message: &message,
        });
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("loader_id", &self.loader_id)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

/// Sink that keeps every record, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: parking_lot::Mutex<Vec<(Severity, String)>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded message of `severity`.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns every recorded warning.
    pub fn warnings(&self) -> Vec<String> {
        self.messages(Severity::Warning)
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, record: &DiagnosticRecord<'_>) {
        self.records
            .lock()
            .push((record.severity, record.message.to_string()));
    }
}
