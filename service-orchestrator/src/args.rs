use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Restarts the local agent services and reports their health.
#[derive(Parser, Debug)]
#[command(name = "service-orchestrator")]
#[command(about = "Stop, launch and health-check local services", long_about = None)]
pub struct Cli {
    /// TOML file layered over the built-in defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the summary as JSON instead of a table.
    #[arg(long, global = true)]
    pub json: bool,

    /// Restrict the run to these services (repeatable). Includes disabled entries.
    #[arg(short, long = "service", value_name = "NAME", global = true)]
    pub services: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Commands {
    /// Stop everything, relaunch, then wait for health (default).
    #[default]
    Up,
    /// Stop the selected services only.
    Stop,
    /// Probe the selected services once.
    Status,
}
