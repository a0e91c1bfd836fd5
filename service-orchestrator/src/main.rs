mod args;

use anyhow::Context;
use args::{Cli, Commands};
use clap::Parser;
use log::{error, info};
use service_orchestrator::config::OrchestratorConfig;
use service_orchestrator::orchestrator::report::{
    render_stop_reports, stop_exit_code, EXIT_FATAL,
};
use service_orchestrator::{LocalRuntime, Orchestrator};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = OrchestratorConfig::load(cli.config.as_deref())?;
    let services = config.services(&cli.services)?;
    let command = cli.command.unwrap_or_default();
    info!(
        "=== Service Orchestrator [{:?}] ({} services under {}) ===",
        command,
        services.len(),
        config.root.display()
    );

    let runtime = LocalRuntime::from_config(&config).context("Failed to build HTTP client")?;
    let orchestrator = Orchestrator::new(Arc::new(runtime), services);

    let code = match command {
        Commands::Up => {
            let report = orchestrator.up().await.context("Run aborted")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            report.exit_code()
        }
        Commands::Stop => {
            let reports = orchestrator.stop_all().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print!("{}", render_stop_reports(&reports));
            }
            stop_exit_code(&reports)
        }
        Commands::Status => {
            let report = orchestrator.status().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            report.exit_code()
        }
    };
    Ok(ExitCode::from(code))
}
