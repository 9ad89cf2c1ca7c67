use std::sync::Arc;

use async_trait::async_trait;
use common::{LogEntry, LogSink, TracingLogSink};

use crate::{Gateway, Record};

const COLLECTION: &str = "custom_logs";

/// Persists every [`LogEntry`] into the `custom_logs` collection, in
/// addition to the usual `tracing` emission. Replaces the original's
/// global warn+ log hook (`syncer/loghook.go`, Design Note 9) with an
/// explicit sink, mirroring `credentials::Store`'s gateway-backed pattern.
pub struct StoreLogSink {
    gateway: Arc<dyn Gateway>,
}

impl StoreLogSink {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl LogSink for StoreLogSink {
    async fn record(&self, entry: LogEntry) {
        TracingLogSink.record(entry.clone()).await;

        let record = Record::new("")
            .set("message", entry.message.as_str())
            .set("level", entry.level.as_str())
            .set("tenant_id", entry.tenant_id.as_deref().unwrap_or(""))
            .set("seller_sku", entry.seller_sku.as_deref().unwrap_or(""))
            .set("trace_id", entry.trace_id.as_str());

        if let Err(err) = self.gateway.create(COLLECTION, record).await {
            tracing::error!(error = %err, "failed to persist log entry to custom_logs");
        }
    }
}
