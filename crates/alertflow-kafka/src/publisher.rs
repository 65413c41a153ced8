use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::EventPublisher;

use crate::backoff::Backoff;

/// Build the shared producer. `acks=all` so an acknowledged publish is
/// durable on the broker before the consumer offset may advance.
pub fn build_producer(brokers: &str) -> Result<FutureProducer> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("acks", "all")
        .set("message.timeout.ms", "10000")
        .create()
        .map_err(|e| FlowError::ConfigInvalid(format!("kafka producer: {e}")))
}

/// `EventPublisher` over a `FutureProducer` with an attempt budget.
/// Exhausting the budget surfaces `Permanent`, which halts the partition
/// rather than advancing past an undelivered message.
pub struct KafkaPublisher {
    producer: FutureProducer,
    max_attempts: u32,
    backoff: Backoff,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer, max_attempts: u32, backoff: Backoff) -> Self {
        KafkaPublisher {
            producer,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            let record = FutureRecord::to(topic).key(key).payload(payload);
            match self.producer.send(record, Timeout::Never).await {
                Ok(_) => return Ok(()),
                Err((err, _)) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(FlowError::Permanent {
                            attempts: attempt,
                            source: err.into(),
                        });
                    }
                    let delay = self.backoff.delay(attempt - 1);
                    tracing::warn!(
                        topic,
                        key,
                        attempt,
                        ?delay,
                        "publish failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
