//! In-memory implementations of every port, for tests and local runs.
//!
//! The snapshot store records the order of key writes so tests can assert
//! the body-before-version discipline; the stores accept injected failure
//! countdowns so retry paths are exercisable without a broker or database.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{FlowError, Result};
use crate::ports::{
    EventPublisher, InsertOutcome, NotificationRow, NotificationStore, RuleStore, SnapshotStore,
};
use crate::types::RuleRecord;

// ── MemorySnapshotStore ───────────────────────────────────────

/// Which KV key a write touched, in write order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotWrite {
    Body,
    Version,
}

struct SnapshotInner {
    body: Option<Vec<u8>>,
    version: Option<u64>,
    writes: Vec<SnapshotWrite>,
    fail_reads: u32,
    fail_writes: u32,
}

/// In-memory snapshot KV.
pub struct MemorySnapshotStore {
    inner: RwLock<SnapshotInner>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SnapshotInner {
                body: None,
                version: None,
                writes: Vec::new(),
                fail_reads: 0,
                fail_writes: 0,
            }),
        }
    }

    /// Seed the store with an already-published snapshot.
    pub async fn seed(&self, body: Vec<u8>, version: u64) {
        let mut inner = self.inner.write().await;
        inner.body = Some(body);
        inner.version = Some(version);
    }

    /// Make the next `n` reads fail with a transient error.
    pub async fn fail_next_reads(&self, n: u32) {
        self.inner.write().await.fail_reads = n;
    }

    /// Make the next `n` writes fail with a transient error.
    pub async fn fail_next_writes(&self, n: u32) {
        self.inner.write().await.fail_writes = n;
    }

    /// The sequence of key writes observed so far.
    pub async fn write_log(&self) -> Vec<SnapshotWrite> {
        self.inner.read().await.writes.clone()
    }

    pub async fn version(&self) -> Option<u64> {
        self.inner.read().await.version
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read_version(&self) -> Result<Option<u64>> {
        let mut inner = self.inner.write().await;
        if inner.fail_reads > 0 {
            inner.fail_reads -= 1;
            return Err(FlowError::transient(anyhow::anyhow!("injected read failure")));
        }
        Ok(inner.version)
    }

    async fn read_body(&self) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write().await;
        if inner.fail_reads > 0 {
            inner.fail_reads -= 1;
            return Err(FlowError::transient(anyhow::anyhow!("injected read failure")));
        }
        Ok(inner.body.clone())
    }

    async fn write(&self, body: &[u8], version: u64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(FlowError::transient(anyhow::anyhow!("injected write failure")));
        }
        inner.body = Some(body.to_vec());
        inner.writes.push(SnapshotWrite::Body);
        inner.version = Some(version);
        inner.writes.push(SnapshotWrite::Version);
        Ok(())
    }
}

// ── MemoryRuleStore ───────────────────────────────────────────

/// In-memory authoritative rule storage.
pub struct MemoryRuleStore {
    inner: RwLock<Vec<RuleRecord>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_rules(&self, rules: Vec<RuleRecord>) {
        *self.inner.write().await = rules;
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn fetch_enabled(&self) -> Result<Vec<RuleRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}

// ── MemoryNotificationStore ───────────────────────────────────

struct NotificationInner {
    rows: BTreeMap<(String, String), NotificationRow>,
    fail_inserts: u32,
}

/// In-memory audit store with first-insert-wins semantics on the
/// `(client_id, alert_id)` key.
pub struct MemoryNotificationStore {
    inner: RwLock<NotificationInner>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(NotificationInner {
                rows: BTreeMap::new(),
                fail_inserts: 0,
            }),
        }
    }

    pub async fn fail_next_inserts(&self, n: u32) {
        self.inner.write().await.fail_inserts = n;
    }

    pub async fn rows(&self) -> Vec<NotificationRow> {
        self.inner.read().await.rows.values().cloned().collect()
    }

    pub async fn get(&self, client_id: &str, alert_id: &str) -> Option<NotificationRow> {
        self.inner
            .read()
            .await
            .rows
            .get(&(client_id.to_string(), alert_id.to_string()))
            .cloned()
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, row: &NotificationRow) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        if inner.fail_inserts > 0 {
            inner.fail_inserts -= 1;
            return Err(FlowError::transient(anyhow::anyhow!(
                "injected insert failure"
            )));
        }
        let key = (row.client_id.clone(), row.alert_id.clone());
        if inner.rows.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.rows.insert(key, row.clone());
        Ok(InsertOutcome::Inserted)
    }
}

// ── MemoryPublisher ───────────────────────────────────────────

/// One captured publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

struct PublisherInner {
    messages: Vec<PublishedMessage>,
    fail_publishes: u32,
}

/// In-memory publisher that captures everything published through it.
pub struct MemoryPublisher {
    inner: RwLock<PublisherInner>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PublisherInner {
                messages: Vec::new(),
                fail_publishes: 0,
            }),
        }
    }

    pub async fn fail_next_publishes(&self, n: u32) {
        self.inner.write().await.fail_publishes = n;
    }

    pub async fn messages(&self) -> Vec<PublishedMessage> {
        self.inner.read().await.messages.clone()
    }

    pub async fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_publishes > 0 {
            inner.fail_publishes -= 1;
            return Err(FlowError::transient(anyhow::anyhow!(
                "injected publish failure"
            )));
        }
        inner.messages.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn snapshot_store_records_write_order() {
        let store = MemorySnapshotStore::new();
        store.write(b"body-1", 1).await.unwrap();
        assert_eq!(
            store.write_log().await,
            vec![SnapshotWrite::Body, SnapshotWrite::Version]
        );
        assert_eq!(store.read_version().await.unwrap(), Some(1));
        assert_eq!(store.read_body().await.unwrap(), Some(b"body-1".to_vec()));
    }

    #[tokio::test]
    async fn notification_store_claims_once() {
        let store = MemoryNotificationStore::new();
        let row = NotificationRow {
            client_id: "c1".into(),
            alert_id: "a1".into(),
            notification_id: Uuid::new_v4(),
            rule_ids: vec![],
            payload: serde_json::json!({}),
            created_at: 0,
        };
        assert_eq!(store.insert(&row).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&row).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_count_down() {
        let publisher = MemoryPublisher::new();
        publisher.fail_next_publishes(1).await;
        assert!(publisher.publish("t", "k", b"x").await.is_err());
        assert!(publisher.publish("t", "k", b"x").await.is_ok());
        assert_eq!(publisher.messages().await.len(), 1);
    }
}
