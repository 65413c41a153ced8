//! alertflow-aggregator — duplicate absorption for match events.
//!
//! For every `(client_id, alert_id)` pair seen on `alerts.matched`, exactly
//! one notification event leaves on `notifications.ready`. The audit row's
//! primary key is the dedupe substrate; there is no time-bounded window.

pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod run;
