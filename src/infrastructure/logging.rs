//! Log subscriber setup and the audit sinks.

use crate::domain::ports::audit_log::{AuditEntry, AuditLog, Severity};
use std::sync::{Mutex, MutexGuard};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}")),
        }
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays pure JSON.
/// `RUST_LOG` wins over `default_level`. A second call is a no-op.
pub fn init_logging(format: LogFormat, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if result.is_err() {
        tracing::debug!("Log subscriber already installed");
    }
}

/// Forwards audit entries to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: AuditEntry) {
        let context = serde_json::Value::Object(entry.context);
        let category = entry.category;
        let message = entry.message;
        match entry.severity {
            Severity::Debug => tracing::debug!(target: "audit", category, %context, "{message}"),
            Severity::Info => tracing::info!(target: "audit", category, %context, "{message}"),
            Severity::Warning => tracing::warn!(target: "audit", category, %context, "{message}"),
            Severity::Error => tracing::error!(target: "audit", category, %context, "{message}"),
            Severity::Critical => {
                tracing::error!(target: "audit", critical = true, category, %context, "{message}")
            }
        }
    }
}

/// Keeps every entry in memory. Used by tests and embedders that want to inspect the trail.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.guard().clone()
    }

    pub fn at_severity(&self, severity: Severity) -> Vec<AuditEntry> {
        self.guard()
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        self.guard().push(entry);
    }
}
