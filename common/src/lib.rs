pub mod logger;
pub mod time;

use async_trait::async_trait;

/// Severity of a [`LogSink`] entry. `Warn`/`Error` mirror the original's
/// warn+ threshold for its global log hook; `Debug` is available for
/// sites that want a level below that threshold without inventing their
/// own enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One entry destined for the `custom_logs` collection.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub tenant_id: Option<String>,
    pub seller_sku: Option<String>,
    pub trace_id: String,
}

/// Explicit logging sink, injected into the syncer rather than installed as
/// a process-global hook. Replaces the source's global warn+ log writer.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn record(&self, entry: LogEntry);
}

/// Sink that only emits to `tracing`; used where no database-backed sink is
/// wired (e.g. unit tests).
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn record(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Debug => tracing::debug!(
                tenant_id = entry.tenant_id.as_deref(),
                seller_sku = entry.seller_sku.as_deref(),
                trace_id = %entry.trace_id,
                "{}",
                entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                tenant_id = entry.tenant_id.as_deref(),
                seller_sku = entry.seller_sku.as_deref(),
                trace_id = %entry.trace_id,
                "{}",
                entry.message
            ),
            LogLevel::Error => tracing::error!(
                tenant_id = entry.tenant_id.as_deref(),
                seller_sku = entry.seller_sku.as_deref(),
                trace_id = %entry.trace_id,
                "{}",
                entry.message
            ),
        }
    }
}
