//! Snapshot loader & reloader.
//!
//! The current index generation lives behind an `ArcSwap`; consumer workers
//! clone the `Arc` before matching, so a match begun against generation N
//! completes against N even if N+1 is installed meanwhile. Old generations
//! drop when the last in-flight match releases its clone.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::index::RuleIndex;
use alertflow_core::ports::SnapshotStore;
use alertflow_core::snapshot::RuleSnapshot;

/// One immutable index generation.
pub struct IndexGeneration {
    pub index: RuleIndex,
    pub version: u64,
}

pub struct SnapshotLoader {
    store: Arc<dyn SnapshotStore>,
    current: ArcSwap<IndexGeneration>,
}

impl std::fmt::Debug for SnapshotLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLoader")
            .field("version", &self.current.load().version)
            .finish()
    }
}

impl SnapshotLoader {
    /// Initial load. Failure here is fatal for the replica: the evaluator
    /// must not consume alerts before a snapshot is installed.
    pub async fn load(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let generation = fetch_generation(store.as_ref()).await?;
        Ok(Self {
            store,
            current: ArcSwap::from_pointee(generation),
        })
    }

    /// The current generation, pinned for the caller's lifetime of use.
    pub fn current(&self) -> Arc<IndexGeneration> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// One immediate version check; fetch, rebuild, and swap when the store
    /// holds a strictly newer version. Returns true when a swap happened.
    pub async fn reload_now(&self) -> Result<bool> {
        let held = self.current.load().version;
        let latest = self
            .store
            .read_version()
            .await?
            .ok_or(FlowError::VersionMissing)?;
        if latest <= held {
            return Ok(false);
        }
        let generation = fetch_generation(self.store.as_ref()).await?;
        self.current.store(Arc::new(generation));
        Ok(true)
    }

    /// Background reloader. Polls at `interval` until cancelled. A failed
    /// reload keeps the previous generation and is retried next tick.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.reload_now().await {
                    Ok(true) => {
                        tracing::info!(version = self.version(), "installed new rule snapshot");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            held_version = self.version(),
                            "snapshot reload failed, keeping current generation: {e}"
                        );
                    }
                },
            }
        }
        tracing::debug!("snapshot reloader stopped");
    }
}

async fn fetch_generation(store: &dyn SnapshotStore) -> Result<IndexGeneration> {
    let version = store
        .read_version()
        .await?
        .ok_or(FlowError::VersionMissing)?;
    let body = store.read_body().await?.ok_or_else(|| {
        FlowError::SnapshotUnavailable("snapshot body key missing".into())
    })?;
    let snapshot = RuleSnapshot::decode(&body)?;
    Ok(IndexGeneration {
        index: RuleIndex::build(&snapshot),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertflow_core::store_memory::MemorySnapshotStore;
    use alertflow_core::types::RuleRecord;
    use uuid::Uuid;

    fn rule(id: u128, severity: &str) -> RuleRecord {
        RuleRecord {
            rule_id: Uuid::from_u128(id),
            client_id: "c1".into(),
            severity: severity.into(),
            source: "api".into(),
            name: "timeout".into(),
            enabled: true,
            version: 1,
        }
    }

    async fn seeded_store(rules: Vec<RuleRecord>, version: u64) -> Arc<MemorySnapshotStore> {
        let store = Arc::new(MemorySnapshotStore::new());
        let body = RuleSnapshot::from_rules(rules).encode().unwrap();
        store.seed(body, version).await;
        store
    }

    #[tokio::test]
    async fn initial_load_requires_both_keys() {
        let empty = Arc::new(MemorySnapshotStore::new());
        let err = SnapshotLoader::load(empty).await.unwrap_err();
        assert!(matches!(err, FlowError::VersionMissing));

        let store = seeded_store(vec![rule(1, "HIGH")], 3).await;
        let loader = SnapshotLoader::load(store).await.unwrap();
        assert_eq!(loader.version(), 3);
        assert_eq!(loader.current().index.len(), 1);
    }

    #[tokio::test]
    async fn reload_swaps_only_on_strictly_newer_version() {
        let store = seeded_store(vec![rule(1, "HIGH")], 5).await;
        let loader = SnapshotLoader::load(Arc::clone(&store) as _).await.unwrap();

        // Same version: no swap.
        assert!(!loader.reload_now().await.unwrap());

        // Newer version with a different rule set: swap.
        let body = RuleSnapshot::from_rules(vec![rule(1, "HIGH"), rule(2, "LOW")])
            .encode()
            .unwrap();
        store.seed(body, 6).await;
        assert!(loader.reload_now().await.unwrap());
        assert_eq!(loader.version(), 6);
        assert_eq!(loader.current().index.len(), 2);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_generation() {
        let store = seeded_store(vec![rule(1, "HIGH")], 1).await;
        let loader = SnapshotLoader::load(Arc::clone(&store) as _).await.unwrap();

        store.seed(b"not a snapshot".to_vec(), 2).await;
        assert!(loader.reload_now().await.is_err());
        assert_eq!(loader.version(), 1);
        assert_eq!(loader.current().index.len(), 1);

        store.fail_next_reads(1).await;
        assert!(loader.reload_now().await.is_err());
        assert_eq!(loader.version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_reloader_picks_up_new_versions() {
        let store = seeded_store(vec![rule(1, "HIGH")], 1).await;
        let loader = Arc::new(
            SnapshotLoader::load(Arc::clone(&store) as _)
                .await
                .unwrap(),
        );

        let cancel = CancellationToken::new();
        let reloader = tokio::spawn({
            let loader = Arc::clone(&loader);
            let cancel = cancel.clone();
            async move { loader.run(Duration::from_secs(5), cancel).await }
        });

        let body = RuleSnapshot::from_rules(vec![rule(1, "HIGH"), rule(2, "LOW")])
            .encode()
            .unwrap();
        store.seed(body, 2).await;

        // Well past one poll interval of (paused) time.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(loader.version(), 2);
        assert_eq!(loader.current().index.len(), 2);

        cancel.cancel();
        reloader.await.unwrap();
    }

    #[tokio::test]
    async fn inflight_generation_survives_a_swap() {
        let store = seeded_store(vec![rule(1, "HIGH")], 1).await;
        let loader = SnapshotLoader::load(Arc::clone(&store) as _).await.unwrap();

        let pinned = loader.current();
        let body = RuleSnapshot::from_rules(vec![]).encode().unwrap();
        store.seed(body, 2).await;
        loader.reload_now().await.unwrap();

        // The pinned generation still answers with the old rule set.
        assert_eq!(pinned.version, 1);
        assert!(!pinned.index.matches("HIGH", "api", "timeout").is_empty());
        assert!(loader.current().index.matches("HIGH", "api", "timeout").is_empty());
    }
}
