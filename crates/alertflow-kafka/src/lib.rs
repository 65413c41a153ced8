//! alertflow-kafka — shared Kafka plumbing for the service replicas.
//!
//! Consumers are built with auto-commit off and earliest start so the
//! at-least-once commit discipline stays in the pipeline's hands; the
//! publisher wraps a `FutureProducer` behind the core `EventPublisher` port
//! with an exponential-backoff retry budget.

pub mod backoff;
pub mod consumer;
pub mod publisher;

pub use backoff::Backoff;
pub use consumer::{build_consumer, commit, ConsumerSettings};
pub use publisher::{build_producer, KafkaPublisher};
