use async_trait::async_trait;
use sqlx::PgPool;

use alertflow_core::error::{FlowError, Result};
use alertflow_core::ports::{InsertOutcome, NotificationRow, NotificationStore};

use crate::epoch_ms_to_datetime;

/// Audit store adapter. The `(client_id, alert_id)` primary key is the
/// dedupe substrate: the database serializes concurrent claimers, and
/// `ON CONFLICT DO NOTHING` turns a lost race into a clean `Duplicate`.
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, row: &NotificationRow) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (client_id, alert_id, notification_id, rule_ids, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (client_id, alert_id) DO NOTHING
            "#,
        )
        .bind(&row.client_id)
        .bind(&row.alert_id)
        .bind(row.notification_id)
        .bind(&row.rule_ids)
        .bind(&row.payload)
        .bind(epoch_ms_to_datetime(row.created_at))
        .execute(&self.pool)
        .await
        .map_err(FlowError::transient)?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }
}
