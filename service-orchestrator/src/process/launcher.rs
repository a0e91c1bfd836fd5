//! Starting services as detached background processes.

use super::pid_store::PidStore;
use crate::config::InstallFailurePolicy;
use crate::error::LaunchError;
use chrono::Utc;
use log::{info, warn};
use service_model::{InstallStep, ProcessHandle, ProcessRecord, ServiceSpec};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::Duration;

const PORT_CHECK_TIMEOUT: Duration = Duration::from_millis(200);

/// What happened to one service at launch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Running detached; readiness is not known yet.
    Launched(ProcessHandle),
    /// Not started; the rest of the run carries on.
    Skipped { reason: String },
}

pub struct Launcher {
    pid_store: PidStore,
    install_failure: InstallFailurePolicy,
    append_logs: bool,
    probe_host: String,
}

impl Launcher {
    pub fn new(
        pid_store: PidStore,
        install_failure: InstallFailurePolicy,
        append_logs: bool,
        probe_host: impl Into<String>,
    ) -> Self {
        Self {
            pid_store,
            install_failure,
            append_logs,
            probe_host: probe_host.into(),
        }
    }

    /// Installs dependencies if declared, then starts `spec` in its own
    /// process group with output going to its log file.
    ///
    /// Returns as soon as the process is spawned.
    pub async fn launch(&self, spec: &ServiceSpec) -> Result<LaunchOutcome, LaunchError> {
        let workdir = spec.working_directory();
        if !workdir.is_dir() {
            warn!(
                "Launcher: working directory {} for '{}' not found, skipping",
                workdir.display(),
                spec.name()
            );
            return Ok(LaunchOutcome::Skipped {
                reason: format!("working directory {} not found", workdir.display()),
            });
        }

        let log = self.open_log(spec)?;

        if let Some(install) = spec.install() {
            if workdir.join(&install.manifest).is_file() {
                if let Err(reason) = self.install(spec, install, &log).await {
                    match self.install_failure {
                        InstallFailurePolicy::Abort => {
                            return Err(LaunchError::DependencyInstall {
                                service: spec.name().to_string(),
                                reason,
                            });
                        }
                        InstallFailurePolicy::Skip => {
                            warn!(
                                "Launcher: dependency install for '{}' failed ({}), skipping",
                                spec.name(),
                                reason
                            );
                            return Ok(LaunchOutcome::Skipped {
                                reason: format!("dependency install failed: {}", reason),
                            });
                        }
                    }
                }
            }
        }

        if port_in_use(&self.probe_host, spec.port()).await {
            warn!(
                "Launcher: port {} already accepts connections; '{}' will probably fail to bind",
                spec.port(),
                spec.name()
            );
        }

        let handle = spawn_detached(spec, log)?;
        self.pid_store
            .record(&ProcessRecord::new(&handle, spec.start_command(), spec.port()))
            .map_err(|source| LaunchError::Record {
                service: spec.name().to_string(),
                source,
            })?;

        info!(
            "Launcher: '{}' started on port {} (PID {}), logging to {}",
            spec.name(),
            spec.port(),
            handle.pid(),
            spec.log_file().display()
        );
        Ok(LaunchOutcome::Launched(handle))
    }

    fn open_log(&self, spec: &ServiceSpec) -> Result<File, LaunchError> {
        let path = spec.log_file();
        let prepare = |source| LaunchError::Prepare {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(prepare)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append_logs)
            .truncate(!self.append_logs)
            .open(path)
            .map_err(prepare)?;
        writeln!(
            file,
            "=== {} launching '{}' on port {} ===",
            Utc::now().to_rfc3339(),
            spec.name(),
            spec.port()
        )
        .map_err(prepare)?;
        Ok(file)
    }

    /// Blocks until the install command exits. The error is a human-readable reason.
    async fn install(
        &self,
        spec: &ServiceSpec,
        install: &InstallStep,
        log: &File,
    ) -> Result<(), String> {
        info!(
            "Launcher: installing dependencies for '{}' ({})",
            spec.name(),
            install.command
        );
        let stdout = log.try_clone().map_err(|e| e.to_string())?;
        let stderr = log.try_clone().map_err(|e| e.to_string())?;

        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&install.command)
            .current_dir(spec.working_directory())
            .envs(spec.env())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .await
            .map_err(|e| format!("could not run '{}': {}", install.command, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("'{}' exited with {}", install.command, status))
        }
    }
}

fn spawn_detached(spec: &ServiceSpec, log: File) -> Result<ProcessHandle, LaunchError> {
    let spawn_error = |source| LaunchError::Spawn {
        service: spec.name().to_string(),
        source,
    };
    let stderr = log.try_clone().map_err(spawn_error)?;

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(shell_line(spec.start_command()))
        .current_dir(spec.working_directory())
        .envs(spec.env())
        .env("PORT", spec.port().to_string())
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(stderr)
        .process_group(0)
        .spawn()
        .map_err(spawn_error)?;

    let pid = child.id();
    // Reap the child if it exits while we are still around; otherwise it is
    // inherited by init when we exit.
    if let Err(e) = std::thread::Builder::new()
        .name(format!("reap-{}", spec.name()))
        .spawn(move || {
            let _ = child.wait();
        })
    {
        warn!(
            "Launcher: no reaper thread for '{}' (PID {}), it stays a zombie after exit until we do: {}",
            spec.name(),
            pid,
            e
        );
    }

    Ok(ProcessHandle::new(spec.name(), pid))
}

/// Prefixes `exec` so the recorded PID is the service itself rather than a
/// wrapping shell. Compound commands are left alone: `exec` would only
/// replace the shell with their first part.
fn shell_line(command: &str) -> String {
    const COMPOUND: &[&str] = &["&", "|", ";", "\n", "`", "$(", "(", ")"];
    if COMPOUND.iter().any(|token| command.contains(token)) {
        command.to_string()
    } else {
        format!("exec {}", command)
    }
}

async fn port_in_use(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(
            PORT_CHECK_TIMEOUT,
            tokio::net::TcpStream::connect((host, port))
        )
        .await,
        Ok(Ok(_))
    )
}
