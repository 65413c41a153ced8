use std::sync::atomic::{AtomicU64, Ordering};

use alertflow_core::error::FlowError;

/// Per-replica counters. Cheap to bump from the hot path; logged on drain.
#[derive(Debug, Default)]
pub struct EvaluatorMetrics {
    pub consumed: AtomicU64,
    pub matched_alerts: AtomicU64,
    pub match_events_published: AtomicU64,
    pub no_match: AtomicU64,
    pub payload_malformed: AtomicU64,
    pub schema_unsupported: AtomicU64,
}

impl EvaluatorMetrics {
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
            matched_alerts = self.matched_alerts.load(Ordering::Relaxed),
            match_events_published = self.match_events_published.load(Ordering::Relaxed),
            no_match = self.no_match.load(Ordering::Relaxed),
            payload_malformed = self.payload_malformed.load(Ordering::Relaxed),
            schema_unsupported = self.schema_unsupported.load(Ordering::Relaxed),
            "evaluator counters"
        );
    }
}
