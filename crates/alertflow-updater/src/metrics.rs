use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct UpdaterMetrics {
    pub events_consumed: AtomicU64,
    pub events_dropped: AtomicU64,
    pub rebuilds: AtomicU64,
}

impl UpdaterMetrics {
    pub fn log_summary(&self) {
        tracing::info!(
            events_consumed = self.events_consumed.load(Ordering::Relaxed),
            events_dropped = self.events_dropped.load(Ordering::Relaxed),
            rebuilds = self.rebuilds.load(Ordering::Relaxed),
            "updater counters"
        );
    }
}
