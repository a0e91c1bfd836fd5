use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Layered sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Two table entries share a name.
    #[error("Service '{0}' is declared more than once")]
    DuplicateService(String),

    /// A `--service` filter names something that is not in the table.
    #[error("Unknown service '{0}'")]
    UnknownService(String),
}

/// Errors that end a launch. A missing working directory is not one of them:
/// it yields a skipped outcome instead.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Log directory or log file could not be prepared.
    #[error("Failed to prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The dependency install step failed under the `abort` policy.
    #[error("Dependency install for '{service}' failed: {reason}")]
    DependencyInstall { service: String, reason: String },

    /// The start command could not be spawned at all.
    #[error("Failed to spawn '{service}': {source}")]
    Spawn {
        service: String,
        source: std::io::Error,
    },

    /// The PID record could not be written.
    #[error("Failed to record PID for '{service}': {source}")]
    Record {
        service: String,
        source: std::io::Error,
    },
}

/// Errors raised while stopping a service. "Nothing to stop" is not one.
#[derive(Error, Debug)]
pub enum TerminateError {
    /// The OS refused to deliver a signal (other than "no such process").
    #[error("Failed to signal PID {pid}: {source}")]
    Signal { pid: u32, source: std::io::Error },

    /// The PID store could not be read or cleared.
    #[error("PID store error: {0}")]
    PidStore(#[from] std::io::Error),
}
