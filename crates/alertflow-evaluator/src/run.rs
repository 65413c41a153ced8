//! Replica wiring and the consume loop.
//!
//! Lifecycle: STARTING (connect, initial snapshot load) → WARM → RUNNING
//! (consume loop + background reloader) → DRAINING (stop intake, finish
//! in-flight publishes, commit) → STOPPED. The drain deadline bounds how
//! long in-flight work may hold up shutdown; work abandoned at the deadline
//! is simply replayed at next start.

use rdkafka::consumer::StreamConsumer;
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::EventPublisher;
use alertflow_kafka::{build_consumer, build_producer, commit, Backoff, ConsumerSettings, KafkaPublisher};
use alertflow_redis::RedisSnapshotStore;

use crate::config::EvaluatorConfig;
use crate::loader::SnapshotLoader;
use crate::pipeline::{EvaluatorPipeline, Handled};

pub async fn run(config: EvaluatorConfig) -> Result<()> {
    tracing::info!(group = %config.consumer_group_id, "evaluator starting");

    let store = Arc::new(RedisSnapshotStore::connect(&config.redis_addr).await?);
    // Warm-start gate: no alert is consumed before this load succeeds.
    let loader = Arc::new(SnapshotLoader::load(store).await?);
    tracing::info!(version = loader.version(), "initial snapshot loaded, replica warm");

    let producer = build_producer(&config.kafka_brokers)?;
    let publisher: Arc<dyn EventPublisher> = Arc::new(KafkaPublisher::new(
        producer,
        config.publish_max_attempts,
        config.publish_backoff(),
    ));
    let pipeline = EvaluatorPipeline::new(
        Arc::clone(&loader),
        publisher,
        config.alerts_matched_topic.clone(),
        config.fanout_window,
    );

    let consumer = build_consumer(&ConsumerSettings {
        brokers: config.kafka_brokers.clone(),
        group_id: config.consumer_group_id.clone(),
        topic: config.alerts_new_topic.clone(),
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));
    let reloader = tokio::spawn({
        let loader = Arc::clone(&loader);
        let cancel = cancel.clone();
        let interval = config.poll_interval();
        async move { loader.run(interval, cancel).await }
    });

    tracing::info!(topic = %config.alerts_new_topic, "evaluator running");
    let result = consume_loop(
        &consumer,
        &pipeline,
        &cancel,
        config.publish_backoff(),
        config.drain_timeout(),
    )
    .await;

    cancel.cancel();
    let _ = reloader.await;
    pipeline.metrics.log_summary();
    tracing::info!("evaluator stopped");
    result
}

async fn consume_loop(
    consumer: &StreamConsumer,
    pipeline: &EvaluatorPipeline,
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
            // Drain interrupted a retry cycle; the offset stays uncommitted
            // and the message replays at next start.
            return Ok(());
        }
    }
}

/// Handle one message to completion: retry transient failures with backoff,
/// halt on a permanent one, commit otherwise. Returns false when a drain
/// abandoned the message mid-retry.
async fn process_message(
    consumer: &StreamConsumer,
    pipeline: &EvaluatorPipeline,
    msg: &rdkafka::message::BorrowedMessage<'_>,
    retry: Backoff,
    cancel: &CancellationToken,
) -> Result<bool> {
    let payload = msg.payload().unwrap_or_default();
    let mut attempt: u32 = 0;
    loop {
        match pipeline.handle(payload).await {
            Ok(handled) => {
                match &handled {
                    Handled::Published(fanout) => {
                        tracing::debug!(offset = msg.offset(), fanout, "alert matched");
                    }
                    Handled::NoMatch => {}
                    Handled::Dropped(err) => {
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
                tracing::warn!(attempt, ?delay, "alert handling failed, retrying: {err}");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(false),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            // Permanent: halt the partition without advancing the offset.
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
