use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Static description of one managed background service.
///
/// Built once from the configuration table and never mutated afterwards.
/// The identity of a service is its `name`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServiceSpec {
    name: String,
    working_directory: PathBuf,
    start_command: String,
    port: u16,
    log_file: PathBuf,
    health_path: String,
    match_pattern: String,
    install: Option<InstallStep>,
    env: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// Creates a spec whose match pattern defaults to the start command.
    pub fn new(
        name: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        start_command: impl Into<String>,
        port: u16,
        log_file: impl Into<PathBuf>,
        health_path: impl Into<String>,
    ) -> Self {
        let start_command = start_command.into();
        Self {
            name: name.into(),
            working_directory: working_directory.into(),
            match_pattern: start_command.clone(),
            start_command,
            port,
            log_file: log_file.into(),
            health_path: health_path.into(),
            install: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_match_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.match_pattern = pattern.into();
        self
    }

    pub fn with_install(mut self, install: InstallStep) -> Self {
        self.install = Some(install);
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn start_command(&self) -> &str {
        &self.start_command
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn health_path(&self) -> &str {
        &self.health_path
    }

    /// Command-line substring used by the best-effort pattern matcher.
    pub fn match_pattern(&self) -> &str {
        &self.match_pattern
    }

    pub fn install(&self) -> Option<&InstallStep> {
        self.install.as_ref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// URL of the health endpoint when reached through `host`.
    pub fn health_url(&self, host: &str) -> String {
        let path = if self.health_path.starts_with('/') {
            self.health_path.clone()
        } else {
            format!("/{}", self.health_path)
        };
        format!("http://{}:{}{}", host, self.port, path)
    }
}

/// A dependency install run before launching, only when `manifest` exists in
/// the working directory.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstallStep {
    pub manifest: String,
    pub command: String,
}

impl InstallStep {
    pub fn new(manifest: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
            command: command.into(),
        }
    }
}
