//! Aggregator wiring. Messages are processed serially per replica;
//! cross-replica parallelism comes from partition assignment alone.

use rdkafka::consumer::StreamConsumer;
use rdkafka::message::Message;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::{EventPublisher, NotificationStore};
use alertflow_kafka::{build_consumer, build_producer, commit, Backoff, ConsumerSettings, KafkaPublisher};
use alertflow_postgres::PgNotificationStore;

use crate::config::AggregatorConfig;
use crate::pipeline::{Aggregated, AggregatorPipeline};

pub async fn run(config: AggregatorConfig) -> Result<()> {
    tracing::info!(group = %config.consumer_group_id, "aggregator starting");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| FlowError::DependencyUnavailable(format!("postgres: {e}")))?;
    if config.run_migrations {
        alertflow_postgres::migrate(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(pool));
    let producer = build_producer(&config.kafka_brokers)?;
    let publisher: Arc<dyn EventPublisher> = Arc::new(KafkaPublisher::new(
        producer,
        config.publish_max_attempts,
        config.publish_backoff(),
    ));
    let pipeline = AggregatorPipeline::new(
        store,
        publisher,
        config.notifications_ready_topic.clone(),
    );

    let consumer = build_consumer(&ConsumerSettings {
        brokers: config.kafka_brokers.clone(),
        group_id: config.consumer_group_id.clone(),
        topic: config.alerts_matched_topic.clone(),
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    tracing::info!(topic = %config.alerts_matched_topic, "aggregator running");
    let result = consume_loop(
        &consumer,
        &pipeline,
        &cancel,
        config.publish_backoff(),
        config.drain_timeout(),
    )
    .await;

    pipeline.metrics.log_summary();
    tracing::info!("aggregator stopped");
    result
}

async fn consume_loop(
    consumer: &StreamConsumer,
    pipeline: &AggregatorPipeline,
    cancel: &CancellationToken,
    retry: Backoff,
    drain_timeout: Duration,
) -> Result<()> {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("drain requested, stopping intake");
                return Ok(());
            }
            received = consumer.recv() => received,
        };
        let msg = match received {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("kafka receive failed: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let committed = tokio::select! {
            res = process_message(consumer, pipeline, &msg, retry, cancel) => res?,
            _ = cancelled_then(cancel, drain_timeout) => {
                tracing::warn!("drain deadline exceeded, abandoning in-flight work");
                return Ok(());
            }
        };
        if !committed {
            return Ok(());
        }
    }
}

async fn process_message(
    consumer: &StreamConsumer,
    pipeline: &AggregatorPipeline,
    msg: &rdkafka::message::BorrowedMessage<'_>,
    retry: Backoff,
    cancel: &CancellationToken,
) -> Result<bool> {
    let payload = msg.payload().unwrap_or_default();
    let mut attempt: u32 = 0;
    loop {
        match pipeline.handle(payload).await {
            Ok(outcome) => {
                match &outcome {
                    Aggregated::Notified(id) => {
                        tracing::debug!(notification_id = %id, "notification emitted");
                    }
                    Aggregated::Duplicate => {}
                    Aggregated::Dropped(err) => {
                        tracing::warn!(offset = msg.offset(), "dropping poison message: {err}");
                    }
                }
                if let Err(err) = commit(consumer, msg) {
                    tracing::warn!("offset commit failed (message will replay): {err}");
                }
                return Ok(true);
            }
            Err(err @ FlowError::Transient(_)) => {
                attempt += 1;
                let delay = retry.delay(attempt - 1);
                tracing::warn!(attempt, ?delay, "match handling failed, retrying: {err}");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(false),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

async fn cancelled_then(cancel: &CancellationToken, grace: Duration) {
    cancel.cancelled().await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    tracing::info!("shutdown signal received, draining");
    cancel.cancel();
}
