use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured entry handed to the telemetry collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Destination for execution log records. Persistence and format belong to
/// the implementor.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait LogSink: Send + Sync {
    fn record(&self, record: LogRecord);
}

/// Forwards records to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, record: LogRecord) {
        let message = record.message.as_deref().unwrap_or("");
        let data = record
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();

        match record.level {
            LogLevel::Debug => tracing::debug!(event = %record.event, data = %data, "{}", message),
            LogLevel::Info => tracing::info!(event = %record.event, data = %data, "{}", message),
            LogLevel::Warn => tracing::warn!(event = %record.event, data = %data, "{}", message),
            LogLevel::Error => tracing::error!(event = %record.event, data = %data, "{}", message),
        }
    }
}
