//! Full-rebuild snapshot builder.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use alertflow_core::error::Result;
use alertflow_core::ports::{RuleStore, SnapshotStore};
use alertflow_core::snapshot::RuleSnapshot;
use alertflow_kafka::Backoff;

pub struct SnapshotBuilder {
    rules: Arc<dyn RuleStore>,
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotBuilder {
    pub fn new(rules: Arc<dyn RuleStore>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { rules, store }
    }

    /// One full rebuild: consistent authoritative read, encode, then publish
    /// as `previous_version + 1`. The store writes body before version, so a
    /// version observer always finds the body. Returns the published
    /// version.
    ///
    /// Rebuilds triggered by duplicate change events are naturally
    /// idempotent: the content comes from storage, and an extra version bump
    /// over identical rules is harmless.
    pub async fn rebuild(&self) -> Result<u64> {
        let rules = self.rules.fetch_enabled().await?;
        let rule_count = rules.len();
        let body = RuleSnapshot::from_rules(rules).encode()?;
        let previous = self.store.read_version().await?.unwrap_or(0);
        let version = previous + 1;
        self.store.write(&body, version).await?;
        tracing::info!(version, rules = rule_count, "published rule snapshot");
        Ok(version)
    }

    /// Retry [`rebuild`](Self::rebuild) with backoff until it succeeds.
    /// Returns `None` when drain is requested mid-retry; the caller must
    /// then leave the triggering offsets uncommitted.
    pub async fn rebuild_with_retry(
        &self,
        retry: Backoff,
        cancel: &CancellationToken,
    ) -> Option<u64> {
        let mut attempt: u32 = 0;
        loop {
            match self.rebuild().await {
                Ok(version) => return Some(version),
                Err(err) => {
                    let delay = retry.delay(attempt);
                    attempt += 1;
                    tracing::warn!(attempt, ?delay, "snapshot rebuild failed, retrying: {err}");
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertflow_core::store_memory::{MemoryRuleStore, MemorySnapshotStore, SnapshotWrite};
    use alertflow_core::types::RuleRecord;
    use std::time::Duration;
    use uuid::Uuid;

    fn rule(id: u128, enabled: bool) -> RuleRecord {
        RuleRecord {
            rule_id: Uuid::from_u128(id),
            client_id: "c1".into(),
            severity: "HIGH".into(),
            source: "api".into(),
            name: "timeout".into(),
            enabled,
            version: 1,
        }
    }

    fn builder(
        rules: Arc<MemoryRuleStore>,
        store: Arc<MemorySnapshotStore>,
    ) -> SnapshotBuilder {
        SnapshotBuilder::new(rules as _, store as _)
    }

    #[tokio::test]
    async fn versions_increase_strictly_across_rebuilds() {
        let rules = Arc::new(MemoryRuleStore::new());
        let store = Arc::new(MemorySnapshotStore::new());
        let builder = builder(Arc::clone(&rules), Arc::clone(&store));

        assert_eq!(builder.rebuild().await.unwrap(), 1);
        assert_eq!(builder.rebuild().await.unwrap(), 2);
        rules.set_rules(vec![rule(1, true)]).await;
        assert_eq!(builder.rebuild().await.unwrap(), 3);
        assert_eq!(store.version().await, Some(3));
    }

    #[tokio::test]
    async fn version_continues_from_the_stored_value() {
        let rules = Arc::new(MemoryRuleStore::new());
        let store = Arc::new(MemorySnapshotStore::new());
        store.seed(b"old".to_vec(), 41).await;
        let builder = builder(rules, Arc::clone(&store));
        assert_eq!(builder.rebuild().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn body_is_written_before_version() {
        let rules = Arc::new(MemoryRuleStore::new());
        let store = Arc::new(MemorySnapshotStore::new());
        let builder = builder(rules, Arc::clone(&store));
        builder.rebuild().await.unwrap();
        assert_eq!(
            store.write_log().await,
            vec![SnapshotWrite::Body, SnapshotWrite::Version]
        );
    }

    #[tokio::test]
    async fn snapshot_carries_only_enabled_rules() {
        let rules = Arc::new(MemoryRuleStore::new());
        rules
            .set_rules(vec![rule(1, true), rule(2, false), rule(3, true)])
            .await;
        let store = Arc::new(MemorySnapshotStore::new());
        let builder = builder(rules, Arc::clone(&store));
        builder.rebuild().await.unwrap();

        let body = store.read_body().await.unwrap().unwrap();
        let snapshot = RuleSnapshot::decode(&body).unwrap();
        let ids: Vec<u128> = snapshot.rules.iter().map(|r| r.rule_id.as_u128()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn retry_survives_transient_store_failures() {
        let rules = Arc::new(MemoryRuleStore::new());
        let store = Arc::new(MemorySnapshotStore::new());
        store.fail_next_writes(2).await;
        let builder = builder(rules, Arc::clone(&store));

        let cancel = CancellationToken::new();
        let retry = Backoff::from_millis(1, 2);
        let version = builder.rebuild_with_retry(retry, &cancel).await;
        assert_eq!(version, Some(1));
    }

    #[tokio::test]
    async fn retry_stops_on_cancellation() {
        let rules = Arc::new(MemoryRuleStore::new());
        let store = Arc::new(MemorySnapshotStore::new());
        store.fail_next_writes(u32::MAX).await;
        let builder = builder(rules, Arc::clone(&store));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let retry = Backoff::new(Duration::from_secs(60), Duration::from_secs(60));
        assert_eq!(builder.rebuild_with_retry(retry, &cancel).await, None);
    }
}
