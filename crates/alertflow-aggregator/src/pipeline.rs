//! Per-message aggregator logic.

use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use alertflow_core::codec;
use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::{EventPublisher, InsertOutcome, NotificationRow, NotificationStore};
use alertflow_core::types::{notification_id, MatchEvent, NotificationEvent};
use uuid::Uuid;

use crate::metrics::AggregatorMetrics;

/// What happened to one `alerts.matched` message. Any `Aggregated` value
/// means the offset may be committed.
#[derive(Debug)]
pub enum Aggregated {
    /// First claim on this `(client_id, alert_id)`: the notification event
    /// was published.
    Notified(Uuid),
    /// Redelivery or replay: the pair was already claimed, nothing emitted.
    Duplicate,
    /// Poison message: dropped, offset advances.
    Dropped(FlowError),
}

pub struct AggregatorPipeline {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<dyn EventPublisher>,
    ready_topic: String,
    pub metrics: Arc<AggregatorMetrics>,
}

impl AggregatorPipeline {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        publisher: Arc<dyn EventPublisher>,
        ready_topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            ready_topic: ready_topic.into(),
            metrics: Arc::new(AggregatorMetrics::default()),
        }
    }

    /// Handle one match event. Insert-then-publish: the audit row is the
    /// atomic check-and-claim, so a crash between insert and publish can at
    /// worst suppress the notification, never duplicate it.
    pub async fn handle(&self, payload: &[u8]) -> Result<Aggregated> {
        self.metrics.consumed.fetch_add(1, Ordering::Relaxed);

        let event: MatchEvent = match codec::decode(payload) {
            Ok(event) => event,
            Err(err) => {
                self.metrics.record_reject(&err);
                return Ok(Aggregated::Dropped(err));
            }
        };

        let notification_id = notification_id(&event.client_id, &event.alert_id);
        let row = NotificationRow {
            client_id: event.client_id.clone(),
            alert_id: event.alert_id.clone(),
            notification_id,
            rule_ids: event.rule_ids.clone(),
            payload: event.payload_json(),
            created_at: Utc::now().timestamp_millis(),
        };

        match self.store.insert(&row).await? {
            InsertOutcome::Duplicate => {
                self.metrics.dedupe_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    client_id = %event.client_id,
                    alert_id = %event.alert_id,
                    "duplicate match event absorbed"
                );
                Ok(Aggregated::Duplicate)
            }
            InsertOutcome::Inserted => {
                let notification = NotificationEvent {
                    schema_version: codec::SCHEMA_VERSION,
                    notification_id,
                    client_id: event.client_id.clone(),
                    alert_id: event.alert_id.clone(),
                    rule_ids: event.rule_ids,
                    event_ts: event.event_ts,
                    severity: event.severity,
                    source: event.source,
                    name: event.name,
                    context: event.context,
                };
                let bytes = codec::encode(&notification)?;
                self.publisher
                    .publish(&self.ready_topic, &notification.client_id, &bytes)
                    .await?;
                self.metrics.notified.fetch_add(1, Ordering::Relaxed);
                Ok(Aggregated::Notified(notification_id))
            }
        }
    }
}
