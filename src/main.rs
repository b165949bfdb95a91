use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod app;
mod attachments;
mod backend;
mod cli;
mod commands;
mod config;
mod conversation;
mod core;
mod deps;
mod display;
mod handlers;
mod input;
mod media;
mod session;
#[cfg(test)]
mod testing;

use crate::app::Application;
use crate::cli::{Args, Command};
use crate::commands::create_command_registry;
use crate::config::Config;
use crate::core::error::QllamaError;
use crate::handlers::registry::registry;

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<ExitCode, QllamaError> {
    match args.command {
        Command::Run(run) => {
            let config = Config::load()?;
            let mut app = Application::start(&run, &config, create_command_registry()).await?;
            app.run().await?;
        }
        Command::List => {
            let models: Vec<_> = registry()
                .entries()
                .map(|(name, entry)| (name, entry.kind, entry.default_model_id))
                .collect();
            display::display_model_list(&models);
        }
        Command::Check { base_url } => {
            let mut backend = Config::load()?.backend;
            if let Some(base_url) = base_url {
                backend.base_url = base_url;
            }

            let results = deps::check_all(&backend).await;
            for result in &results {
                display::display_check(&result.name, result.ok, result.critical, &result.detail);
            }
            if !deps::critical_ok(&results) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    tracing::debug!("Starting qllama...");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            display::display_error(&e);
            ExitCode::FAILURE
        }
    }
}
