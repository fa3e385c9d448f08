mod cli;
mod commands;
mod logging;
mod settings;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = AppSettings::load(cli.config.as_deref())?;

    let mut logging = settings.logging.clone();
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    if cli.json_logs {
        logging = logging.with_json();
    }
    logging::setup_logging(&logging)?;
    debug!(
        "callcomposite v{} (core v{})",
        env!("CARGO_PKG_VERSION"),
        callcomposite_core::VERSION
    );

    let history = Arc::new(settings.history.open());
    debug!("Call history: {:?}", settings.history.storage_path);

    match cli.command {
        Command::History(command) => commands::history::run(command, &history),
        Command::Push(args) => commands::push::run(args, &settings, history).await,
    }
}
