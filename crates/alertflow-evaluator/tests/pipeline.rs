//! Integration tests: drive the evaluator pipeline through the memory
//! ports, exactly the way the consume loop does per message.

use std::collections::BTreeMap;
use std::sync::Arc;

use alertflow_core::codec;
use alertflow_core::snapshot::RuleSnapshot;
use alertflow_core::store_memory::{MemoryPublisher, MemorySnapshotStore};
use alertflow_core::types::{Alert, MatchEvent, RuleRecord};
use alertflow_evaluator::loader::SnapshotLoader;
use alertflow_evaluator::pipeline::{EvaluatorPipeline, Handled};
use uuid::Uuid;

const MATCHED_TOPIC: &str = "alerts.matched";

fn rule(id: u128, client: &str, severity: &str, source: &str, name: &str) -> RuleRecord {
    RuleRecord {
        rule_id: Uuid::from_u128(id),
        client_id: client.to_string(),
        severity: severity.to_string(),
        source: source.to_string(),
        name: name.to_string(),
        enabled: true,
        version: 1,
    }
}

fn alert(alert_id: &str, severity: &str, source: &str, name: &str) -> Alert {
    Alert {
        schema_version: codec::SCHEMA_VERSION,
        alert_id: alert_id.to_string(),
        event_ts: 1_700_000_000_000,
        severity: severity.to_string(),
        source: source.to_string(),
        name: name.to_string(),
        context: BTreeMap::from([("region".to_string(), "eu-1".to_string())]),
    }
}

struct Harness {
    store: Arc<MemorySnapshotStore>,
    loader: Arc<SnapshotLoader>,
    publisher: Arc<MemoryPublisher>,
    pipeline: EvaluatorPipeline,
}

async fn harness(rules: Vec<RuleRecord>) -> Harness {
    let store = Arc::new(MemorySnapshotStore::new());
    let body = RuleSnapshot::from_rules(rules).encode().unwrap();
    store.seed(body, 1).await;

    let loader = Arc::new(SnapshotLoader::load(Arc::clone(&store) as _).await.unwrap());
    let publisher = Arc::new(MemoryPublisher::new());
    let pipeline = EvaluatorPipeline::new(
        Arc::clone(&loader),
        Arc::clone(&publisher) as _,
        MATCHED_TOPIC,
        8,
    );
    Harness {
        store,
        loader,
        publisher,
        pipeline,
    }
}

/// Exact match, single tenant: one match event keyed by the tenant.
#[tokio::test]
async fn exact_match_publishes_one_event_for_the_tenant() {
    let h = harness(vec![rule(1, "C1", "HIGH", "api", "timeout")]).await;

    let input = codec::encode(&alert("A1", "HIGH", "api", "timeout")).unwrap();
    let handled = h.pipeline.handle(&input).await.unwrap();
    assert!(matches!(handled, Handled::Published(1)));

    let published = h.publisher.messages_on(MATCHED_TOPIC).await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, "C1");

    let event: MatchEvent = codec::decode(&published[0].payload).unwrap();
    assert_eq!(event.alert_id, "A1");
    assert_eq!(event.client_id, "C1");
    assert_eq!(event.rule_ids, vec![Uuid::from_u128(1)]);
    assert_eq!(event.context["region"], "eu-1");
}

/// Wildcard fan-in: one tenant, one event carrying all four matching
/// rules.
#[tokio::test]
async fn wildcard_fan_in_collapses_into_one_event() {
    let h = harness(vec![
        rule(1, "C1", "HIGH", "api", "timeout"),
        rule(2, "C1", "*", "api", "timeout"),
        rule(3, "C1", "HIGH", "*", "timeout"),
        rule(4, "C1", "HIGH", "api", "*"),
    ])
    .await;

    let input = codec::encode(&alert("A1", "HIGH", "api", "timeout")).unwrap();
    h.pipeline.handle(&input).await.unwrap();

    let published = h.publisher.messages_on(MATCHED_TOPIC).await;
    assert_eq!(published.len(), 1);
    let event: MatchEvent = codec::decode(&published[0].payload).unwrap();
    let ids: Vec<u128> = event.rule_ids.iter().map(|u| u.as_u128()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

/// Multi-tenant fan-out: one event per matching tenant, none for bystanders.
#[tokio::test]
async fn fan_out_emits_exactly_one_event_per_matching_tenant() {
    let h = harness(vec![
        rule(1, "C1", "HIGH", "api", "timeout"),
        rule(2, "C2", "*", "api", "timeout"),
        rule(3, "C3", "LOW", "*", "*"),
    ])
    .await;

    let input = codec::encode(&alert("A1", "HIGH", "api", "timeout")).unwrap();
    let handled = h.pipeline.handle(&input).await.unwrap();
    assert!(matches!(handled, Handled::Published(2)));

    let mut keys: Vec<String> = h
        .publisher
        .messages_on(MATCHED_TOPIC)
        .await
        .into_iter()
        .map(|m| m.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["C1", "C2"]);
}

#[tokio::test]
async fn no_match_publishes_nothing() {
    let h = harness(vec![rule(1, "C1", "HIGH", "api", "timeout")]).await;

    let input = codec::encode(&alert("A1", "LOW", "api", "timeout")).unwrap();
    let handled = h.pipeline.handle(&input).await.unwrap();
    assert!(matches!(handled, Handled::NoMatch));
    assert!(h.publisher.messages().await.is_empty());
}

/// Poison messages are dropped and counted with no downstream side
/// effects, and the outcome still allows the offset to commit.
#[tokio::test]
async fn unsupported_schema_is_dropped_without_side_effects() {
    let h = harness(vec![rule(1, "C1", "HIGH", "api", "timeout")]).await;

    let mut bad = alert("A1", "HIGH", "api", "timeout");
    bad.schema_version = 42;
    let handled = h.pipeline.handle(&codec::encode(&bad).unwrap()).await.unwrap();
    assert!(matches!(handled, Handled::Dropped(_)));

    let handled = h.pipeline.handle(b"{garbage").await.unwrap();
    assert!(matches!(handled, Handled::Dropped(_)));

    assert!(h.publisher.messages().await.is_empty());
    let metrics = &h.pipeline.metrics;
    assert_eq!(
        metrics
            .schema_unsupported
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    assert_eq!(
        metrics
            .payload_malformed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

/// A failed tenant publish must surface as an error so the offset is never
/// committed with a partial fan-out.
#[tokio::test]
async fn publish_failure_prevents_offset_commit() {
    let h = harness(vec![
        rule(1, "C1", "HIGH", "api", "timeout"),
        rule(2, "C2", "*", "api", "timeout"),
    ])
    .await;

    h.publisher.fail_next_publishes(1).await;
    let input = codec::encode(&alert("A1", "HIGH", "api", "timeout")).unwrap();
    assert!(h.pipeline.handle(&input).await.is_err());

    // Replay after the failure succeeds and re-publishes for every tenant
    // (duplicates downstream are the aggregator's problem).
    let handled = h.pipeline.handle(&input).await.unwrap();
    assert!(matches!(handled, Handled::Published(2)));
}

/// Hot reload: a snapshot disabling the only rule takes effect after the
/// reload, and matches already pinned on the old generation are unaffected.
#[tokio::test]
async fn hot_reload_changes_match_results() {
    let h = harness(vec![rule(1, "C1", "HIGH", "api", "timeout")]).await;
    let input = codec::encode(&alert("A1", "HIGH", "api", "timeout")).unwrap();

    let handled = h.pipeline.handle(&input).await.unwrap();
    assert!(matches!(handled, Handled::Published(1)));

    // Publish generation 2 with the rule disabled.
    let mut disabled = rule(1, "C1", "HIGH", "api", "timeout");
    disabled.enabled = false;
    let body = RuleSnapshot::from_rules(vec![disabled]).encode().unwrap();
    h.store.seed(body, 2).await;
    assert!(h.loader.reload_now().await.unwrap());

    let input = codec::encode(&alert("A2", "HIGH", "api", "timeout")).unwrap();
    let handled = h.pipeline.handle(&input).await.unwrap();
    assert!(matches!(handled, Handled::NoMatch));
    assert_eq!(h.publisher.messages_on(MATCHED_TOPIC).await.len(), 1);
}
