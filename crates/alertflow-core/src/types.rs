use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

/// Tenant identifier. Opaque to the data plane.
pub type ClientId = String;

/// Rule identifier, assigned by the rule-management surface.
pub type RuleId = Uuid;

/// Compact rule handle, valid only within one index generation.
pub type Handle = u32;

/// The literal wildcard token in a rule field.
pub const WILDCARD: &str = "*";

// ─── Severity ─────────────────────────────────────────────────

/// The known severity enumeration. Alerts carry severity as a raw token so
/// that a value outside this set still flows through the matcher (where it
/// can only meet `*` rules) instead of failing decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Alert (ingress) ──────────────────────────────────────────

/// Raw alert as produced on `alerts.new`. Immutable; `alert_id` is the
/// partition key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub schema_version: u32,
    pub alert_id: String,
    /// Wall-clock origin time, epoch ms.
    pub event_ts: Timestamp,
    /// Raw severity token; see [`Severity`].
    pub severity: String,
    pub source: String,
    pub name: String,
    /// Opaque pass-through context.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

// ─── Rule ─────────────────────────────────────────────────────

/// One enabled-rule record as carried in a snapshot body. Each of
/// `severity`/`source`/`name` is a concrete token or [`WILDCARD`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule_id: RuleId,
    pub client_id: ClientId,
    pub severity: String,
    pub source: String,
    pub name: String,
    pub enabled: bool,
    /// Monotonic per rule, bumped by the management surface.
    pub version: i64,
}

impl RuleRecord {
    /// A rule may not wildcard all three match fields. Enforced upstream at
    /// creation; the index builder skips offending records defensively.
    pub fn is_all_wildcard(&self) -> bool {
        self.severity == WILDCARD && self.source == WILDCARD && self.name == WILDCARD
    }
}

// ─── Topic events ─────────────────────────────────────────────

/// Action carried on `rule.changed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleChangeAction {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "UPDATED")]
    Updated,
    #[serde(rename = "DELETED")]
    Deleted,
    #[serde(rename = "DISABLED")]
    Disabled,
}

/// Change notification consumed by the rule updater. The event only triggers
/// a rebuild; rule content is re-read from authoritative storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChangeEvent {
    pub schema_version: u32,
    pub rule_id: RuleId,
    pub client_id: ClientId,
    pub action: RuleChangeAction,
    pub version: i64,
    pub updated_at: Timestamp,
}

/// One message on `alerts.matched` per (alert, matching tenant) pair.
/// Partition key is `client_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub schema_version: u32,
    pub alert_id: String,
    pub client_id: ClientId,
    pub event_ts: Timestamp,
    pub severity: String,
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub rule_ids: Vec<RuleId>,
}

impl MatchEvent {
    pub fn from_alert(alert: &Alert, client_id: ClientId, rule_ids: Vec<RuleId>) -> Self {
        MatchEvent {
            schema_version: crate::codec::SCHEMA_VERSION,
            alert_id: alert.alert_id.clone(),
            client_id,
            event_ts: alert.event_ts,
            severity: alert.severity.clone(),
            source: alert.source.clone(),
            name: alert.name.clone(),
            context: alert.context.clone(),
            rule_ids,
        }
    }

    /// The alert payload portion, as persisted in the audit row.
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::json!({
            "event_ts": self.event_ts,
            "severity": self.severity,
            "source": self.source,
            "name": self.name,
            "context": self.context,
        })
    }
}

/// One message on `notifications.ready` per deduplicated (client, alert)
/// pair. `notification_id` is a deterministic function of that pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub schema_version: u32,
    pub notification_id: Uuid,
    pub client_id: ClientId,
    pub alert_id: String,
    pub rule_ids: Vec<RuleId>,
    pub event_ts: Timestamp,
    pub severity: String,
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// Namespace for the v5 notification id. Fixed so that re-derivation on any
/// replica yields the same value for the same (client_id, alert_id).
pub const NOTIFICATION_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6e, 0x2a, 0x51, 0xc4, 0x0b, 0x7d, 0x4f, 0x3a, 0x9c, 0x15, 0x8f, 0x02, 0xd7, 0x64, 0xa1,
    0x3b,
]);

/// Deterministic notification id: the table PK supplies the real uniqueness
/// guarantee, this id exists for external correlation.
pub fn notification_id(client_id: &str, alert_id: &str) -> Uuid {
    let mut material = Vec::with_capacity(client_id.len() + alert_id.len() + 1);
    material.extend_from_slice(client_id.as_bytes());
    material.push(0);
    material.extend_from_slice(alert_id.as_bytes());
    Uuid::new_v5(&NOTIFICATION_ID_NAMESPACE, &material)
}
