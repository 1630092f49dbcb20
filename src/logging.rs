//! Structured logging sink used by every import component
//!
//! Components never log through a global; they receive a `&dyn LogSink` and call
//! `record(level, message, context)`. The default sink forwards to `tracing`.

use crate::config::{LogFormat, LogLevel, LoggingConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::EnvFilter;

/// Severity of a sink record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Destination for structured log records
pub trait LogSink: Send + Sync {
    fn record(&self, level: Severity, message: &str, context: &[(&str, String)]);
}

/// Sink that forwards records to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, level: Severity, message: &str, context: &[(&str, String)]) {
        let context = render_context(context);
        match level {
            Severity::Debug => tracing::debug!(context = %context, "{}", message),
            Severity::Info => tracing::info!(context = %context, "{}", message),
            Severity::Warning => tracing::warn!(context = %context, "{}", message),
            Severity::Error => tracing::error!(context = %context, "{}", message),
        }
    }
}

fn render_context(context: &[(&str, String)]) -> String {
    context
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A record captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: Severity,
    pub message: String,
    pub context: Vec<(String, String)>,
}

impl LogEntry {
    /// Look up a context value by key
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory sink, optionally forwarding to another sink
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
    forward: Option<Box<dyn LogSink>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record locally and also forward every record to `sink`
    pub fn forwarding(sink: impl LogSink + 'static) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            forward: Some(Box::new(sink)),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Number of records at exactly `level`
    pub fn count(&self, level: Severity) -> usize {
        self.entries.lock().iter().filter(|e| e.level == level).count()
    }
}

impl LogSink for RecordingSink {
    fn record(&self, level: Severity, message: &str, context: &[(&str, String)]) {
        self.entries.lock().push(LogEntry {
            level,
            message: message.to_string(),
            context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        if let Some(ref sink) = self.forward {
            sink.record(level, message, context);
        }
    }
}

/// Install the global `tracing` subscriber for the binary
///
/// Each `-v` raises the configured level by one step. `RUST_LOG` wins when set.
pub fn init_subscriber(config: &LoggingConfig, verbose: u8) -> anyhow::Result<()> {
    let level = raise_level(&config.level, verbose);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("siteimport={},warn", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn raise_level(level: &LogLevel, verbose: u8) -> LogLevel {
    let mut level = level.clone();
    for _ in 0..verbose {
        level = match level {
            LogLevel::Error => LogLevel::Warn,
            LogLevel::Warn => LogLevel::Info,
            LogLevel::Info => LogLevel::Debug,
            LogLevel::Debug | LogLevel::Trace => LogLevel::Trace,
        };
    }
    level
}
