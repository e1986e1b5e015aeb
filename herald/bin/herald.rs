use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::Parser;
use herald::{CONFIG_ERROR_EXIT, Cli, Settings};
use herald_common::{logging, tracing};
use herald_delivery::DeliveryOutcome;

fn load_settings(dotenv: Result<PathBuf, dotenv::Error>) -> anyhow::Result<Settings> {
    if let Err(e) = dotenv
        && !e.not_found()
    {
        return Err(e).context("Failed to load .env");
    }

    let cli = Cli::parse();
    Settings::load(cli).context("Invalid configuration")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Loaded first so LOG_LEVEL may come from .env
    let dotenv = dotenv::dotenv();
    logging::init();

    let settings = match load_settings(dotenv) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(CONFIG_ERROR_EXIT);
        }
    };

    let transport = herald::smtp_transport(&settings);

    match herald::run(&settings, transport).await {
        Ok(DeliveryOutcome::DryRun(preview)) => {
            println!("{preview}");
            ExitCode::SUCCESS
        }
        Ok(DeliveryOutcome::Sent(report)) => {
            println!("Email has been sent successfully ({})", report.receipt.id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            e.exit_code()
        }
    }
}
