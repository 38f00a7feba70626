//! Structured diagnostic surface for the engine and addins.
//!
//! Weave diagnostics flow to a caller-supplied [`WeaveLogger`]; presentation
//! is the host's concern. Each entry carries a severity, a channel name and
//! optionally the source location of the member being visited. By convention
//! only [`Severity::Error`] entries should fail a calling build pipeline;
//! warnings and per-addin exceptions are advisory.

use std::fmt;

use crate::metadata::types::MemberLocation;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Progress and summary information
    Info,
    /// Something looks off but weaving continued unaffected
    Warning,
    /// A rewrite could not be applied; should fail a build pipeline
    Error,
    /// An addin failed; isolated and recovered at the dispatch boundary
    Exception,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
            Severity::Exception => f.write_str("exception"),
        }
    }
}

/// One structured diagnostic entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity of this entry
    pub severity: Severity,
    /// Channel name, conventionally the addin or engine component name
    pub channel: String,
    /// Human-readable message
    pub message: String,
    /// Source location of the affected member, when debug symbols had one
    pub location: Option<MemberLocation>,
}

impl LogEntry {
    /// Creates an entry without a member location.
    #[must_use]
    pub fn new(severity: Severity, channel: &str, message: String) -> Self {
        LogEntry {
            severity,
            channel: channel.to_string(),
            message,
            location: None,
        }
    }

    /// Attaches a member location.
    #[must_use]
    pub fn at(mut self, location: Option<MemberLocation>) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.channel, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// Sink for weave diagnostics.
///
/// Implementations must not fail; diagnostics are fire-and-forget from the
/// engine's point of view.
pub trait WeaveLogger {
    /// Receives one diagnostic entry.
    fn log(&mut self, entry: LogEntry);
}

/// Logger that retains every entry, for tests and batch reporting.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    /// All received entries, in arrival order
    pub entries: Vec<LogEntry>,
}

impl CollectingLogger {
    /// Creates an empty collecting logger.
    #[must_use]
    pub fn new() -> Self {
        CollectingLogger::default()
    }

    /// Whether any entry has [`Severity::Error`] or worse.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity >= Severity::Error)
    }

    /// All entries of the given severity.
    #[must_use]
    pub fn with_severity(&self, severity: Severity) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.severity == severity)
            .collect()
    }
}

impl WeaveLogger for CollectingLogger {
    fn log(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }
}

/// Logger that forwards entries to the `tracing` subscriber of the process.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl WeaveLogger for TracingLogger {
    fn log(&mut self, entry: LogEntry) {
        match entry.severity {
            Severity::Info => tracing::info!(channel = %entry.channel, "{}", entry.message),
            Severity::Warning => tracing::warn!(channel = %entry.channel, "{}", entry.message),
            Severity::Error | Severity::Exception => {
                tracing::error!(channel = %entry.channel, "{}", entry.message);
            }
        }
    }
}
