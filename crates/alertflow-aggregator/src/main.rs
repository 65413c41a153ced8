//! alertflow-aggregator — long-running aggregator replica.
//!
//! Exit codes: 0 clean drain, 2 config invalid, 3 fatal dependency at
//! startup.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use alertflow_aggregator::config::AggregatorConfig;
use alertflow_aggregator::run;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,alertflow_aggregator=debug".into()),
        )
        .init();

    let config = AggregatorConfig::parse();
    if let Err(err) = config.validate() {
        tracing::error!("invalid configuration: {err}");
        return ExitCode::from(err.exit_code());
    }

    match run::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("aggregator terminated: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
