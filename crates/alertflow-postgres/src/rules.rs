use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::RuleStore;
use alertflow_core::types::RuleRecord;

#[derive(FromRow)]
struct PgRuleRow {
    rule_id: Uuid,
    client_id: String,
    severity: String,
    source: String,
    name: String,
    enabled: bool,
    version: i64,
}

impl From<PgRuleRow> for RuleRecord {
    fn from(row: PgRuleRow) -> Self {
        RuleRecord {
            rule_id: row.rule_id,
            client_id: row.client_id,
            severity: row.severity,
            source: row.source,
            name: row.name,
            enabled: row.enabled,
            version: row.version,
        }
    }
}

/// Read-only adapter over the authoritative `rules` table.
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    /// One REPEATABLE READ transaction so the snapshot builder sees a single
    /// consistent picture of the rule base. ORDER BY keeps rebuild output
    /// stable for identical stored state.
    async fn fetch_enabled(&self) -> Result<Vec<RuleRecord>> {
        let mut tx = self.pool.begin().await.map_err(FlowError::transient)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(FlowError::transient)?;
        let rows = sqlx::query_as::<_, PgRuleRow>(
            r#"
            SELECT rule_id, client_id, severity, source, name, enabled, version
            FROM rules
            WHERE enabled = TRUE
            ORDER BY rule_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(FlowError::transient)?;
        tx.commit().await.map_err(FlowError::transient)?;
        Ok(rows.into_iter().map(RuleRecord::from).collect())
    }
}
