//! load-runner entrypoint.
//!
//! Simulates a fixed number of concurrent users, each loading the target URL
//! and then issuing a series of jittered GET requests, and prints a summary
//! report with latency and failure statistics.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `LOAD_RUNNER_*` variables override the config file
//! - `RUST_LOG` overrides `--log-level`
//!
//! Exits non-zero if any request failed or the run was interrupted.

mod client;
mod config;
mod error;
mod report;
mod runner;
mod session;
mod sig_down;
mod stats;
mod telemetry;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

use crate::config::{CliArgs, RunConfig, Settings};
use crate::report::Banner;
use crate::runner::LoadRunner;
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env variables
    dotenvy::dotenv().ok();

    let cli = CliArgs::parse();
    Telemetry::new().with_level(cli.log_level.clone()).register();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: CliArgs) -> Result<ExitCode> {
    let settings = Settings::load(&cli)?;
    let config = RunConfig::try_from(settings)?;

    let sig_down = SigDown::try_new().context("Failed to install signal handlers")?;
    let runner = LoadRunner::new(
        config,
        sig_down.stop_flag(),
        sig_down.cancellation_token(),
    )
    .context("Failed to build HTTP client")?;

    println!("{}", Banner(runner.config()));
    let report = runner.run_all().await;
    println!("{}", report);

    Ok(report.exit_code())
}
