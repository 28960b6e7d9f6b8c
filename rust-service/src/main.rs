//! learnif. dispatch runner - performs one newsletter dispatch invocation.
//!
//! Intended for cron-style exec triggers and manual runs; the HTTP trigger
//! in `learnif-web` drives the same workflow.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use learnif::dispatch::{self, DispatchOutcome};
use learnif::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("dispatch_runner_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        sheet_configured = config.sheet_id.is_some(),
        folder_configured = config.drive_folder_id.is_some(),
        batch_size = config.batch_size,
        "config_loaded"
    );

    let batch_size = config.batch_size;
    match dispatch::run_with_config(&config, batch_size).await? {
        DispatchOutcome::NoContent => {
            tracing::info!("dispatch_runner_no_content");
        }
        DispatchOutcome::Completed(report) => {
            tracing::info!(
                issue = %report.issue,
                sent = report.sent,
                failed = report.failed,
                "dispatch_runner_complete"
            );
        }
    }

    Ok(())
}
