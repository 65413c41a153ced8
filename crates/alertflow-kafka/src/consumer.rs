use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;

use alertflow_core::error::{FlowError, Result};

/// Everything needed to join a consumer group on one topic.
#[derive(Clone, Debug)]
pub struct ConsumerSettings {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
}

/// Build a stream consumer with the at-least-once defaults: manual commits
/// only, fresh groups start from earliest.
pub fn build_consumer(settings: &ConsumerSettings) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &settings.brokers)
        .set("group.id", &settings.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .create()
        .map_err(|e| FlowError::ConfigInvalid(format!("kafka consumer: {e}")))?;
    consumer
        .subscribe(&[settings.topic.as_str()])
        .map_err(|e| FlowError::ConfigInvalid(format!("subscribe {}: {e}", settings.topic)))?;
    Ok(consumer)
}

/// Commit the offset of a handled message. Only call after every side effect
/// of the message has been acknowledged.
pub fn commit(consumer: &StreamConsumer, msg: &BorrowedMessage<'_>) -> Result<()> {
    consumer
        .commit_message(msg, CommitMode::Async)
        .map_err(FlowError::transient)
}
