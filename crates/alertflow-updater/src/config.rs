use clap::Parser;
use std::time::Duration;

use alertflow_core::error::{FlowError, Result};
use alertflow_kafka::Backoff;

#[derive(Parser, Debug, Clone)]
#[command(name = "alertflow-updater", about = "Rule snapshot publisher replica")]
pub struct UpdaterConfig {
    /// Comma-separated Kafka bootstrap brokers.
    #[arg(long, env = "ALERTFLOW_KAFKA_BROKERS")]
    pub kafka_brokers: String,

    #[arg(long, env = "ALERTFLOW_RULE_CHANGED_TOPIC", default_value = "rule.changed")]
    pub rule_changed_topic: String,

    #[arg(long, env = "ALERTFLOW_CONSUMER_GROUP_ID", default_value = "rule-updater-group")]
    pub consumer_group_id: String,

    /// Authoritative rules store (Postgres connection string).
    #[arg(long, env = "ALERTFLOW_DATABASE_URL")]
    pub database_url: String,

    /// Shared snapshot store (`host:port` or redis:// URL).
    #[arg(long, env = "ALERTFLOW_REDIS_ADDR")]
    pub redis_addr: String,

    /// Run the embedded database migrations before consuming.
    #[arg(long, env = "ALERTFLOW_RUN_MIGRATIONS", default_value_t = false)]
    pub run_migrations: bool,

    /// Window in which further rule-change events are absorbed into one
    /// rebuild.
    #[arg(long, env = "ALERTFLOW_COALESCE_WINDOW_MS", default_value_t = 250)]
    pub coalesce_window_ms: u64,

    #[arg(long, env = "ALERTFLOW_REBUILD_BACKOFF_BASE_MS", default_value_t = 200)]
    pub rebuild_backoff_base_ms: u64,

    #[arg(long, env = "ALERTFLOW_REBUILD_BACKOFF_CAP_MS", default_value_t = 10_000)]
    pub rebuild_backoff_cap_ms: u64,

    /// Hard deadline for graceful drain, seconds.
    #[arg(long, env = "ALERTFLOW_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,
}

impl UpdaterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kafka_brokers.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("kafka-brokers must not be empty".into()));
        }
        if self.database_url.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("database-url must not be empty".into()));
        }
        if self.redis_addr.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("redis-addr must not be empty".into()));
        }
        Ok(())
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn rebuild_backoff(&self) -> Backoff {
        Backoff::from_millis(self.rebuild_backoff_base_ms, self.rebuild_backoff_cap_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
