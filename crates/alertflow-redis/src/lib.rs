//! Redis implementation of the shared snapshot store.
//!
//! Two keys: `rules:snapshot` holds the serialized body, `rules:version` the
//! monotonic revision as an ASCII integer. `write` sets the body key before
//! the version key, which is what lets the evaluator treat a version
//! increment as proof the body is present.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::SnapshotStore;

pub const SNAPSHOT_BODY_KEY: &str = "rules:snapshot";
pub const SNAPSHOT_VERSION_KEY: &str = "rules:version";

pub struct RedisSnapshotStore {
    conn: ConnectionManager,
    body_key: String,
    version_key: String,
}

impl RedisSnapshotStore {
    /// Connect to `addr` (`host:port` or a full `redis://` URL).
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{addr}")
        };
        let client = redis::Client::open(url.as_str())
            .map_err(|e| FlowError::ConfigInvalid(format!("redis addr {addr:?}: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| FlowError::SnapshotUnavailable(format!("redis {addr}: {e}")))?;
        Ok(Self {
            conn,
            body_key: SNAPSHOT_BODY_KEY.to_string(),
            version_key: SNAPSHOT_VERSION_KEY.to_string(),
        })
    }

    /// Override the KV keys (tests, multi-plane deployments).
    pub fn with_keys(mut self, body_key: impl Into<String>, version_key: impl Into<String>) -> Self {
        self.body_key = body_key.into();
        self.version_key = version_key.into();
        self
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn read_version(&self) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&self.version_key)
            .await
            .map_err(FlowError::transient)?;
        match raw {
            None => Ok(None),
            Some(s) => s.trim().parse::<u64>().map(Some).map_err(|_| {
                FlowError::SnapshotMalformed(format!("version key is not an integer: {s:?}"))
            }),
        }
    }

    async fn read_body(&self) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(&self.body_key)
            .await
            .map_err(FlowError::transient)
    }

    async fn write(&self, body: &[u8], version: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(&self.body_key, body)
            .await
            .map_err(FlowError::transient)?;
        let _: () = conn
            .set(&self.version_key, version)
            .await
            .map_err(FlowError::transient)?;
        Ok(())
    }
}
