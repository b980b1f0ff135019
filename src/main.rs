use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use contextpilot_bridge::{cli_types::Cli, BridgeConfig, BridgeError, CliApp, LogFormat};

fn init_tracing(config: &BridgeConfig, verbose: bool) {
    let default_directive = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = BridgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config, cli.verbose);

    let app = CliApp::new(config, cli.verbose, cli.json, !cli.no_color);
    app.run(cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<BridgeError>() {
                Some(bridge_err) => bridge_err.to_user_facing().to_string(),
                None => format!("{:#}", e),
            };
            eprintln!("{} {}", "ContextPilot Error:".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}
