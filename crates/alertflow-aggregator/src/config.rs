use clap::Parser;
use std::time::Duration;

use alertflow_core::error::{FlowError, Result};
use alertflow_kafka::Backoff;

#[derive(Parser, Debug, Clone)]
#[command(name = "alertflow-aggregator", about = "Match-event aggregator replica")]
pub struct AggregatorConfig {
    /// Comma-separated Kafka bootstrap brokers.
    #[arg(long, env = "ALERTFLOW_KAFKA_BROKERS")]
    pub kafka_brokers: String,

    #[arg(long, env = "ALERTFLOW_ALERTS_MATCHED_TOPIC", default_value = "alerts.matched")]
    pub alerts_matched_topic: String,

    #[arg(
        long,
        env = "ALERTFLOW_NOTIFICATIONS_READY_TOPIC",
        default_value = "notifications.ready"
    )]
    pub notifications_ready_topic: String,

    #[arg(long, env = "ALERTFLOW_CONSUMER_GROUP_ID", default_value = "aggregator-group")]
    pub consumer_group_id: String,

    /// Notification audit store (Postgres connection string).
    #[arg(long, env = "ALERTFLOW_DATABASE_URL")]
    pub database_url: String,

    /// Run the embedded database migrations before consuming.
    #[arg(long, env = "ALERTFLOW_RUN_MIGRATIONS", default_value_t = false)]
    pub run_migrations: bool,

    #[arg(long, env = "ALERTFLOW_PUBLISH_MAX_ATTEMPTS", default_value_t = 5)]
    pub publish_max_attempts: u32,

    #[arg(long, env = "ALERTFLOW_PUBLISH_BACKOFF_BASE_MS", default_value_t = 100)]
    pub publish_backoff_base_ms: u64,

    #[arg(long, env = "ALERTFLOW_PUBLISH_BACKOFF_CAP_MS", default_value_t = 5000)]
    pub publish_backoff_cap_ms: u64,

    /// Hard deadline for graceful drain, seconds.
    #[arg(long, env = "ALERTFLOW_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kafka_brokers.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("kafka-brokers must not be empty".into()));
        }
        if self.database_url.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("database-url must not be empty".into()));
        }
        if self.publish_max_attempts == 0 {
            return Err(FlowError::ConfigInvalid(
                "publish-max-attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn publish_backoff(&self) -> Backoff {
        Backoff::from_millis(self.publish_backoff_base_ms, self.publish_backoff_cap_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_interface_contract() {
        let config = AggregatorConfig::parse_from([
            "alertflow-aggregator",
            "--kafka-brokers",
            "broker:9092",
            "--database-url",
            "postgres://notifications",
        ]);
        config.validate().unwrap();
        assert_eq!(config.alerts_matched_topic, "alerts.matched");
        assert_eq!(config.notifications_ready_topic, "notifications.ready");
        assert_eq!(config.consumer_group_id, "aggregator-group");
        assert_eq!(config.drain_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_database_url_is_rejected() {
        let mut config = AggregatorConfig::parse_from([
            "alertflow-aggregator",
            "--kafka-brokers",
            "broker:9092",
            "--database-url",
            "x",
        ]);
        config.database_url = "".into();
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);
    }
}
