//! Per-message evaluator logic, kept free of Kafka so the whole contract is
//! testable over the memory ports.

use futures::stream::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use alertflow_core::codec;
use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::EventPublisher;
use alertflow_core::types::{Alert, MatchEvent};

use crate::loader::SnapshotLoader;
use crate::metrics::EvaluatorMetrics;

/// What happened to one `alerts.new` message. Any `Handled` value means the
/// offset may be committed; an `Err` from [`EvaluatorPipeline::handle`]
/// means it must not be.
#[derive(Debug)]
pub enum Handled {
    /// All per-tenant publishes were acknowledged.
    Published(usize),
    NoMatch,
    /// Poison message (bad schema or bad payload): dropped, offset advances.
    Dropped(FlowError),
}

pub struct EvaluatorPipeline {
    loader: Arc<SnapshotLoader>,
    publisher: Arc<dyn EventPublisher>,
    matched_topic: String,
    fanout_window: usize,
    pub metrics: Arc<EvaluatorMetrics>,
}

impl EvaluatorPipeline {
    pub fn new(
        loader: Arc<SnapshotLoader>,
        publisher: Arc<dyn EventPublisher>,
        matched_topic: impl Into<String>,
        fanout_window: usize,
    ) -> Self {
        Self {
            loader,
            publisher,
            matched_topic: matched_topic.into(),
            fanout_window: fanout_window.max(1),
            metrics: Arc::new(EvaluatorMetrics::default()),
        }
    }

    /// Handle one message from `alerts.new`.
    pub async fn handle(&self, payload: &[u8]) -> Result<Handled> {
        self.metrics.consumed.fetch_add(1, Ordering::Relaxed);

        let alert: Alert = match codec::decode(payload) {
            Ok(alert) => alert,
            // Decode failures are poison pills by policy: count, drop, commit.
            Err(err) => {
                self.metrics.record_reject(&err);
                return Ok(Handled::Dropped(err));
            }
        };

        // Pin the generation for the whole match + fan-out of this alert.
        let generation = self.loader.current();
        let matched = generation
            .index
            .matches(&alert.severity, &alert.source, &alert.name);

        if matched.is_empty() {
            self.metrics.no_match.fetch_add(1, Ordering::Relaxed);
            return Ok(Handled::NoMatch);
        }

        let events: Vec<MatchEvent> = matched
            .into_iter()
            .map(|(client_id, rule_ids)| MatchEvent::from_alert(&alert, client_id, rule_ids))
            .collect();
        let fanout = events.len();

        // Publishes for distinct tenants run in parallel inside a bounded
        // window; every one must be acked before the offset may commit.
        let mut publishes = futures::stream::iter(events.into_iter().map(|event| {
            let publisher = Arc::clone(&self.publisher);
            let topic = self.matched_topic.clone();
            async move {
                let bytes = codec::encode(&event)?;
                publisher.publish(&topic, &event.client_id, &bytes).await
            }
        }))
        .buffer_unordered(self.fanout_window);

        while let Some(result) = publishes.next().await {
            result?;
        }

        self.metrics.matched_alerts.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .match_events_published
            .fetch_add(fanout as u64, Ordering::Relaxed);
        Ok(Handled::Published(fanout))
    }
}
