//! Updater wiring: `rule.changed` consume loop with event coalescing.

use rdkafka::consumer::StreamConsumer;
use rdkafka::message::{BorrowedMessage, Message};
use sqlx::postgres::PgPoolOptions;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use alertflow_core::codec;
use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::{RuleStore, SnapshotStore};
use alertflow_core::types::RuleChangeEvent;
use alertflow_kafka::{build_consumer, commit, ConsumerSettings};
use alertflow_postgres::PgRuleStore;
use alertflow_redis::RedisSnapshotStore;

use crate::builder::SnapshotBuilder;
use crate::config::UpdaterConfig;
use crate::metrics::UpdaterMetrics;

pub async fn run(config: UpdaterConfig) -> Result<()> {
    tracing::info!(group = %config.consumer_group_id, "updater starting");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| FlowError::DependencyUnavailable(format!("postgres: {e}")))?;
    if config.run_migrations {
        alertflow_postgres::migrate(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let rules: Arc<dyn RuleStore> = Arc::new(PgRuleStore::new(pool));
    let store: Arc<dyn SnapshotStore> =
        Arc::new(RedisSnapshotStore::connect(&config.redis_addr).await?);
    let builder = SnapshotBuilder::new(rules, store);
    let metrics = UpdaterMetrics::default();

    // Publish an initial snapshot so evaluator replicas on a fresh
    // deployment find both keys in place before the first rule change.
    let version = builder.rebuild().await.map_err(|e| {
        FlowError::DependencyUnavailable(format!("startup snapshot publish: {e}"))
    })?;
    tracing::info!(version, "startup snapshot published");

    let consumer = build_consumer(&ConsumerSettings {
        brokers: config.kafka_brokers.clone(),
        group_id: config.consumer_group_id.clone(),
        topic: config.rule_changed_topic.clone(),
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    tracing::info!(topic = %config.rule_changed_topic, "updater running");
    let result = consume_loop(&consumer, &builder, &metrics, &cancel, &config).await;

    metrics.log_summary();
    tracing::info!("updater stopped");
    result
}

async fn consume_loop(
    consumer: &StreamConsumer,
    builder: &SnapshotBuilder,
    metrics: &UpdaterMetrics,
    cancel: &CancellationToken,
    config: &UpdaterConfig,
) -> Result<()> {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("drain requested, stopping intake");
                return Ok(());
            }
            received = consumer.recv() => received,
        };
        let first = match received {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("kafka receive failed: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let mut batch: Vec<BorrowedMessage<'_>> = Vec::new();
        let mut triggers = usize::from(classify(&first, metrics).is_some());
        batch.push(first);

        // Absorb any change events already queued behind the trigger; one
        // rebuild satisfies all of them.
        loop {
            match tokio::time::timeout(config.coalesce_window(), consumer.recv()).await {
                Ok(Ok(next)) => {
                    triggers += usize::from(classify(&next, metrics).is_some());
                    batch.push(next);
                }
                Ok(Err(e)) => {
                    tracing::warn!("kafka receive failed during coalesce: {e}");
                    break;
                }
                Err(_) => break,
            }
        }

        if triggers > 0 {
            let rebuilt = tokio::select! {
                version = builder.rebuild_with_retry(config.rebuild_backoff(), cancel) => version,
                _ = cancelled_then(cancel, config.drain_timeout()) => {
                    tracing::warn!("drain deadline exceeded, abandoning in-flight rebuild");
                    return Ok(());
                }
            };
            let Some(version) = rebuilt else {
                // Drained mid-retry: offsets stay uncommitted, the events
                // replay at next start.
                return Ok(());
            };
            metrics.rebuilds.fetch_add(1, Ordering::Relaxed);
            tracing::info!(version, coalesced = triggers, "rebuild complete");
        }

        for msg in &batch {
            if let Err(err) = commit(consumer, msg) {
                tracing::warn!("offset commit failed (event will replay): {err}");
            }
        }
    }
}

/// Decode one `rule.changed` message. Poison messages (unknown schema, bad
/// payload) return `None` and are committed without triggering a rebuild.
fn classify(msg: &BorrowedMessage<'_>, metrics: &UpdaterMetrics) -> Option<RuleChangeEvent> {
    metrics.events_consumed.fetch_add(1, Ordering::Relaxed);
    match codec::decode::<RuleChangeEvent>(msg.payload().unwrap_or_default()) {
        Ok(event) => {
            tracing::debug!(
                rule_id = %event.rule_id,
                client_id = %event.client_id,
                action = ?event.action,
                rule_version = event.version,
                "rule change received"
            );
            Some(event)
        }
        Err(err) => {
            metrics.events_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(offset = msg.offset(), "dropping poison rule-change event: {err}");
            None
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
