//! Postgres implementations of the relational ports.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid a compile-time DB requirement.

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;

use alertflow_core::error::{FlowError, Result};

mod notifications;
mod rules;

pub use notifications::PgNotificationStore;
pub use rules::PgRuleStore;

/// Run the embedded migrations (clients, rules, notifications).
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run alertflow migrations")
        .map_err(FlowError::Internal)?;
    Ok(())
}

/// Convert an epoch-ms i64 to a `DateTime<Utc>` for TIMESTAMPTZ binding.
pub(crate) fn epoch_ms_to_datetime(epoch_ms: i64) -> DateTime<Utc> {
    let secs = epoch_ms.div_euclid(1000);
    let nanos = (epoch_ms.rem_euclid(1000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_ms_conversion_handles_sub_second_part() {
        let dt = epoch_ms_to_datetime(1_700_000_000_123);
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn epoch_ms_conversion_handles_pre_epoch_times() {
        let dt = epoch_ms_to_datetime(-1_500);
        assert_eq!(dt.timestamp_millis(), -1_500);
    }
}
