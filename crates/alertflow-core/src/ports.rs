//! Storage and publish port traits, implemented by alertflow-postgres,
//! alertflow-redis, and alertflow-kafka. Pipeline logic depends only on
//! these traits, never on a client crate directly.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ClientId, RuleRecord, Timestamp};

/// The shared fast-access snapshot store: one key for the serialized body,
/// one for the monotonic version integer.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` when the version key has never been written.
    async fn read_version(&self) -> Result<Option<u64>>;

    /// `None` when the body key has never been written.
    async fn read_body(&self) -> Result<Option<Vec<u8>>>;

    /// Publish a snapshot. The body key MUST be durably written before the
    /// version key so any observer of a version increment can rely on the
    /// body being present.
    async fn write(&self, body: &[u8], version: u64) -> Result<()>;
}

/// Authoritative rule storage (relational, owned upstream). The data plane
/// only reads it.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All enabled rules in a single consistent read.
    async fn fetch_enabled(&self) -> Result<Vec<RuleRecord>>;
}

/// Outcome of the atomic check-and-claim insert on the audit store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The `(client_id, alert_id)` pair was already claimed. Expected on
    /// redelivery; not an error.
    Duplicate,
}

/// One notification audit row. PK is `(client_id, alert_id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationRow {
    pub client_id: ClientId,
    pub alert_id: String,
    pub notification_id: Uuid,
    pub rule_ids: Vec<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

/// Notification audit store. The relational PK serializes writers on a
/// single `(client_id, alert_id)` key for free.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, row: &NotificationRow) -> Result<InsertOutcome>;
}

/// Topic publisher. Implementations own delivery acknowledgement and the
/// retry budget; a returned `Ok` means the broker acked the write.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;
}
