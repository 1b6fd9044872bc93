use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;
mod model;
mod service;

use app::{AppError, AppState};
use cli::{Cli, Commands};
use model::Config;
use service::CancelFlag;

/// Exit status of a run stopped by Ctrl-C
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "ocsf-refinery failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let config = Config::from_env(cli.config.as_deref());
    let state = AppState::new(config)?;
    cancel_on_ctrl_c(state.cancel.clone());

    match cli.command {
        Commands::Refine(args) => {
            let workflow = state.refinement_workflow(args.input, args.output, args.concurrency)?;
            let summary = workflow.run(&state.cancel).await?;

            tracing::info!(
                run_id = %summary.run_id,
                documents = summary.results.len(),
                success_rate = summary.report.success_rate,
                "Refinement run finished"
            );
            if summary.cancelled {
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
        }
        Commands::Map(args) => {
            let summary = state
                .mapping_run(args.input, args.output)
                .run(&state.cancel)
                .await?;
            if state.cancel.is_cancelled() {
                tracing::warn!(files = summary.files, "Mapping run cancelled");
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Stop starting new documents once Ctrl-C is pressed
fn cancel_on_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, finishing documents already in progress");
                cancel.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Unable to listen for Ctrl-C"),
        }
    });
}
