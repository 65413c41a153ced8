//! alertflow-evaluator — long-running evaluator replica.
//!
//! Exit codes: 0 clean drain, 2 config invalid, 3 fatal dependency at
//! startup (e.g. snapshot unavailable).

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use alertflow_evaluator::config::EvaluatorConfig;
use alertflow_evaluator::run;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,alertflow_evaluator=debug".into()),
        )
        .init();

    let config = EvaluatorConfig::parse();
    if let Err(err) = config.validate() {
        tracing::error!("invalid configuration: {err}");
        return ExitCode::from(err.exit_code());
    }

    match run::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("evaluator terminated: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
