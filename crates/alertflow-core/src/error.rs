use thiserror::Error;

/// Error taxonomy for the data plane. Variants map one-to-one onto the
/// propagation policies the pipelines apply: discard-and-commit, retry with
/// backoff, halt the partition, or die at startup.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("snapshot malformed: {0}")]
    SnapshotMalformed(String),

    #[error("snapshot version key missing")]
    VersionMissing,

    /// A required external collaborator (database, broker) could not be
    /// reached. Fatal at startup.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("unsupported schema version {0}")]
    SchemaUnsupported(u32),

    #[error("malformed payload: {0}")]
    PayloadMalformed(String),

    /// Kafka/DB/KV hiccup. Retried with backoff; the offset is held until the
    /// operation succeeds.
    #[error("transient I/O failure: {0}")]
    Transient(#[source] anyhow::Error),

    /// Retry budget exhausted. Halts the affected partition; operator
    /// intervention required.
    #[error("permanent I/O failure after {attempts} attempt(s): {source}")]
    Permanent {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FlowError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        FlowError::Transient(err.into())
    }

    /// Process exit code when this error terminates a replica.
    /// 2 = config invalid, 3 = fatal dependency at startup.
    pub fn exit_code(&self) -> u8 {
        match self {
            FlowError::ConfigInvalid(_) => 2,
            FlowError::SnapshotUnavailable(_)
            | FlowError::SnapshotMalformed(_)
            | FlowError::VersionMissing
            | FlowError::DependencyUnavailable(_) => 3,
            _ => 1,
        }
    }

    /// Poison-pill failures: the message is logged, counted, and its offset
    /// committed so the partition keeps moving.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            FlowError::SchemaUnsupported(_) | FlowError::PayloadMalformed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_cli_contract() {
        assert_eq!(FlowError::ConfigInvalid("x".into()).exit_code(), 2);
        assert_eq!(FlowError::SnapshotUnavailable("x".into()).exit_code(), 3);
        assert_eq!(FlowError::VersionMissing.exit_code(), 3);
        assert_eq!(FlowError::SchemaUnsupported(9).exit_code(), 1);
    }

    #[test]
    fn only_decode_failures_are_discardable() {
        assert!(FlowError::SchemaUnsupported(2).is_discardable());
        assert!(FlowError::PayloadMalformed("bad json".into()).is_discardable());
        assert!(!FlowError::transient(anyhow::anyhow!("timeout")).is_discardable());
        assert!(!FlowError::VersionMissing.is_discardable());
    }
}
