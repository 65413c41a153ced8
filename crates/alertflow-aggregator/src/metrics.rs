use std::sync::atomic::{AtomicU64, Ordering};

use alertflow_core::error::FlowError;

#[derive(Debug, Default)]
pub struct AggregatorMetrics {
    pub consumed: AtomicU64,
    pub notified: AtomicU64,
    pub dedupe_hits: AtomicU64,
    pub payload_malformed: AtomicU64,
    pub schema_unsupported: AtomicU64,
}

impl AggregatorMetrics {
    pub fn record_reject(&self, err: &FlowError) {
        match err {
            FlowError::SchemaUnsupported(_) => {
                self.schema_unsupported.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.payload_malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            consumed = self.consumed.load(Ordering::Relaxed),
            notified = self.notified.load(Ordering::Relaxed),
            dedupe_hits = self.dedupe_hits.load(Ordering::Relaxed),
            payload_malformed = self.payload_malformed.load(Ordering::Relaxed),
            schema_unsupported = self.schema_unsupported.load(Ordering::Relaxed),
            "aggregator counters"
        );
    }
}
