use clap::Parser;
use std::time::Duration;

use alertflow_core::error::{FlowError, Result};
use alertflow_kafka::Backoff;

/// Evaluator replica configuration. Every option can also come from the
/// environment (`ALERTFLOW_*`).
#[derive(Parser, Debug, Clone)]
#[command(name = "alertflow-evaluator", about = "Alert rule evaluator replica")]
pub struct EvaluatorConfig {
    /// Comma-separated Kafka bootstrap brokers.
    #[arg(long, env = "ALERTFLOW_KAFKA_BROKERS")]
    pub kafka_brokers: String,

    #[arg(long, env = "ALERTFLOW_ALERTS_NEW_TOPIC", default_value = "alerts.new")]
    pub alerts_new_topic: String,

    #[arg(long, env = "ALERTFLOW_ALERTS_MATCHED_TOPIC", default_value = "alerts.matched")]
    pub alerts_matched_topic: String,

    #[arg(long, env = "ALERTFLOW_CONSUMER_GROUP_ID", default_value = "evaluator-group")]
    pub consumer_group_id: String,

    /// Shared snapshot store (`host:port` or redis:// URL).
    #[arg(long, env = "ALERTFLOW_REDIS_ADDR")]
    pub redis_addr: String,

    /// Seconds between snapshot version polls.
    #[arg(long, env = "ALERTFLOW_VERSION_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub version_poll_interval_secs: u64,

    #[arg(long, env = "ALERTFLOW_PUBLISH_MAX_ATTEMPTS", default_value_t = 5)]
    pub publish_max_attempts: u32,

    #[arg(long, env = "ALERTFLOW_PUBLISH_BACKOFF_BASE_MS", default_value_t = 100)]
    pub publish_backoff_base_ms: u64,

    #[arg(long, env = "ALERTFLOW_PUBLISH_BACKOFF_CAP_MS", default_value_t = 5000)]
    pub publish_backoff_cap_ms: u64,

    /// Bound on concurrently in-flight per-tenant publishes for one alert.
    #[arg(long, env = "ALERTFLOW_FANOUT_WINDOW", default_value_t = 32)]
    pub fanout_window: usize,

    /// Hard deadline for graceful drain, seconds.
    #[arg(long, env = "ALERTFLOW_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kafka_brokers.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("kafka-brokers must not be empty".into()));
        }
        if self.redis_addr.trim().is_empty() {
            return Err(FlowError::ConfigInvalid("redis-addr must not be empty".into()));
        }
        if self.version_poll_interval_secs == 0 {
            return Err(FlowError::ConfigInvalid(
                "version-poll-interval-secs must be at least 1".into(),
            ));
        }
        if self.publish_max_attempts == 0 {
            return Err(FlowError::ConfigInvalid(
                "publish-max-attempts must be at least 1".into(),
            ));
        }
        if self.fanout_window == 0 {
            return Err(FlowError::ConfigInvalid("fanout-window must be at least 1".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.version_poll_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn publish_backoff(&self) -> Backoff {
        Backoff::from_millis(self.publish_backoff_base_ms, self.publish_backoff_cap_ms)
    }
}
