//! Rule snapshot body: the serialized picture of all enabled rules the
//! updater publishes and the evaluator loads. The version integer lives
//! under its own KV key and is not part of the body; observers that see a
//! version increment can rely on the body already being present because the
//! store writes body first, version second.

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::types::RuleRecord;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// A consistent, immutable picture of all enabled rules at one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub schema_version: u32,
    pub rules: Vec<RuleRecord>,
}

impl RuleSnapshot {
    pub fn empty() -> Self {
        RuleSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            rules: Vec::new(),
        }
    }

    /// Build a snapshot body from an authoritative read. Rules are ordered by
    /// `rule_id` so two rebuilds over the same stored state produce identical
    /// bytes.
    pub fn from_rules(mut rules: Vec<RuleRecord>) -> Self {
        rules.sort_by_key(|r| r.rule_id);
        RuleSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            rules,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FlowError::Internal(e.into()))
    }

    /// Any decode failure (bad JSON, missing fields, or a schema version
    /// this build does not know) is `SnapshotMalformed`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let snapshot: RuleSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| FlowError::SnapshotMalformed(e.to_string()))?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(FlowError::SnapshotMalformed(format!(
                "unknown snapshot schema version {}",
                snapshot.schema_version
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rule(id: u128) -> RuleRecord {
        RuleRecord {
            rule_id: Uuid::from_u128(id),
            client_id: "c1".into(),
            severity: "HIGH".into(),
            source: "api".into(),
            name: "timeout".into(),
            enabled: true,
            version: 1,
        }
    }

    #[test]
    fn from_rules_orders_by_rule_id() {
        let snapshot = RuleSnapshot::from_rules(vec![rule(3), rule(1), rule(2)]);
        let ids: Vec<_> = snapshot.rules.iter().map(|r| r.rule_id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
    }

    #[test]
    fn encode_decode_round_trip() {
        let snapshot = RuleSnapshot::from_rules(vec![rule(1), rule(2)]);
        let decoded = RuleSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn rebuilds_over_same_rules_are_byte_identical() {
        let a = RuleSnapshot::from_rules(vec![rule(2), rule(1)]).encode().unwrap();
        let b = RuleSnapshot::from_rules(vec![rule(1), rule(2)]).encode().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decode_failures_are_snapshot_malformed() {
        let err = RuleSnapshot::decode(b"]").unwrap_err();
        assert!(matches!(err, FlowError::SnapshotMalformed(_)));

        let mut snapshot = RuleSnapshot::empty();
        snapshot.schema_version = 7;
        let err = RuleSnapshot::decode(&serde_json::to_vec(&snapshot).unwrap()).unwrap_err();
        assert!(matches!(err, FlowError::SnapshotMalformed(_)));
    }
}
