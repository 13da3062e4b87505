//! `tek-submit` entry point.
//!
//! This binary is the composition root for the workspace. Responsibilities:
//!
//! 1. **Parse configuration**: load the JSON config file (or defaults), apply
//!    command-line overrides, and validate it.
//! 2. **Wire observability**: configure `tracing-subscriber` with a JSON or
//!    pretty layer and, when an endpoint is configured, an OpenTelemetry OTLP
//!    exporter. Every span and event emitted by the workspace crates flows
//!    through this subscriber.
//! 3. **Construct infrastructure**: create the simulated exposure-notification
//!    service, consent store and reporters, and inject them into a
//!    [`flow::SubmissionFlowController`].
//! 4. **Run a session**: play the submission screen from the configured user
//!    answers and print a JSON summary on stdout.

mod config;
mod session;
mod telemetry;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::{CliConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "tek-submit",
    version,
    about = "Runs one scripted TEK submission session against a simulated platform"
)]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides whether the user has consented to submission.
    #[arg(long)]
    consent: Option<bool>,

    /// Overrides the log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = CliConfig::load(args.config.as_deref())?;
    if let Some(consent) = args.consent {
        config.session.consent_given = consent;
    }
    if let Some(format) = args.log_format {
        config.log.format = format;
    }

    let telemetry = telemetry::init(&config.log)?;
    info!(
        request_code = %config.retrieval.permission_request_code,
        fetch_timeout_ms = config.retrieval.fetch_timeout_ms,
        "Starting submission session"
    );

    let summary = session::run(&config.session, config.retrieval.clone()).await;
    info!(destination = ?summary.destination, mode = %summary.submission_mode, "Session finished");
    telemetry.shutdown();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
