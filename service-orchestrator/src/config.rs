//! Run configuration.
//!
//! Layered: built-in defaults → TOML file → `ORCHESTRATOR__*` env → `ROOT` env.
//! Everything is resolved once into immutable [`ServiceSpec`]s before any
//! component runs.

use crate::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use service_model::{InstallStep, ServiceSpec};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the base directory.
pub const ROOT_ENV: &str = "ROOT";

/// Prefix of the layered environment source (`ORCHESTRATOR__PATTERN_FALLBACK=true`).
pub const ENV_PREFIX: &str = "ORCHESTRATOR";

/// File looked up under the root when no `--config` is given.
pub const ROOT_CONFIG_FILE: &str = "orchestrator.toml";

const DEFAULT_ROOT_NAME: &str = "ai-agent-hub";
const UVICORN_RELOAD: &str = "uvicorn main:app --host 0.0.0.0 --port {port} --reload";
const PIP_INSTALL: &str = "pip install -q -r requirements.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base directory for service working directories, logs and PID records.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Relative to `root` unless absolute.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Relative to `root` unless absolute.
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
    #[serde(default = "default_probe_host")]
    pub probe_host: String,

    // Timings (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Also stop untracked processes whose command line contains the match pattern.
    #[serde(default)]
    pub pattern_fallback: bool,
    #[serde(default)]
    pub install_failure: InstallFailurePolicy,
    /// Append to service logs instead of truncating them on each launch.
    #[serde(default)]
    pub append_logs: bool,

    #[serde(default = "default_services")]
    pub services: Vec<ServiceEntry>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            log_dir: default_log_dir(),
            run_dir: default_run_dir(),
            probe_host: default_probe_host(),
            initial_delay_ms: default_initial_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            pattern_fallback: false,
            install_failure: InstallFailurePolicy::default(),
            append_logs: false,
            services: default_services(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads the configuration, taking the root override from `ROOT`.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let root = std::env::var_os(ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::load_with(config_file, root)
    }

    /// Loads the configuration with an explicit root override.
    ///
    /// Without `config_file`, `<root>/orchestrator.toml` is used when it exists.
    pub fn load_with(config_file: Option<&Path>, root: Option<PathBuf>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        let file = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let base = root.clone().unwrap_or_else(default_root);
                Some(base.join(ROOT_CONFIG_FILE)).filter(|p| p.is_file())
            }
        };
        if let Some(path) = file {
            debug!("Config: reading {}", path.display());
            builder = builder.add_source(File::from(path).required(config_file.is_some()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        if let Some(root) = root {
            builder = builder.set_override("root", root.to_string_lossy().into_owned())?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(&self.log_dir)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.run_dir)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Resolves the service table into specs.
    ///
    /// With an empty `only`, every enabled entry is returned in table order.
    /// Otherwise exactly the named entries are returned, enabled or not.
    pub fn services(&self, only: &[String]) -> Result<Vec<ServiceSpec>, ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.services {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateService(entry.name.clone()));
            }
        }
        if let Some(unknown) = only.iter().find(|name| !seen.contains(name.as_str())) {
            return Err(ConfigError::UnknownService(unknown.clone()));
        }

        Ok(self
            .services
            .iter()
            .filter(|entry| {
                if only.is_empty() {
                    entry.enabled
                } else {
                    only.iter().any(|name| name == &entry.name)
                }
            })
            .map(|entry| self.resolve(entry))
            .collect())
    }

    fn resolve(&self, entry: &ServiceEntry) -> ServiceSpec {
        let render = |template: &str| render_template(template, entry, &self.root);

        let log_file = entry
            .log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.log", entry.name)));

        let mut spec = ServiceSpec::new(
            entry.name.clone(),
            self.root.join(&entry.working_directory),
            render(&entry.start_command),
            entry.port,
            self.log_dir().join(log_file),
            entry.health_path.clone(),
        );
        if let Some(pattern) = &entry.match_pattern {
            spec = spec.with_match_pattern(render(pattern));
        }
        if let Some(install) = &entry.install {
            spec = spec.with_install(InstallStep::new(
                install.manifest.clone(),
                render(&install.command),
            ));
        }
        let env = entry
            .env
            .iter()
            .map(|(k, v)| (k.clone(), render(v)))
            .collect();
        spec.with_env(env)
    }
}

/// What to do when a dependency install fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallFailurePolicy {
    /// End the whole run; services stopped so far stay down.
    #[default]
    Abort,
    /// Warn and skip only the failing service.
    Skip,
}

/// One row of the service table, before resolution against the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub working_directory: PathBuf,
    /// `{port}`, `{name}` and `{root}` are substituted.
    ///
    /// A single command is exec'd so the tracked PID is the service. A
    /// compound command (`cd x && uvicorn ...`) keeps its shell, which then
    /// is the tracked PID; stopping still reaches the service through the
    /// process group.
    pub start_command: String,
    pub port: u16,
    /// Relative to the log directory; defaults to `<name>.log`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Defaults to the rendered start command.
    #[serde(default)]
    pub match_pattern: Option<String>,
    #[serde(default)]
    pub install: Option<InstallStep>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ServiceEntry {
    pub fn new(
        name: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        start_command: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            working_directory: working_directory.into(),
            start_command: start_command.into(),
            port,
            log_file: None,
            health_path: default_health_path(),
            match_pattern: None,
            install: None,
            env: BTreeMap::new(),
            enabled: true,
        }
    }
}

fn render_template(template: &str, entry: &ServiceEntry, root: &Path) -> String {
    template
        .replace("{port}", &entry.port.to_string())
        .replace("{name}", &entry.name)
        .replace("{root}", &root.to_string_lossy())
}

fn default_root() -> PathBuf {
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(DEFAULT_ROOT_NAME),
        None => PathBuf::from(DEFAULT_ROOT_NAME),
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".logs")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from(".run")
}

fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_readiness_timeout_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_enabled() -> bool {
    true
}

/// The hub, the two appraisal agents, and the dashboard (off by default).
fn default_services() -> Vec<ServiceEntry> {
    let python_service = |name: &str, dir: &str, port: u16| ServiceEntry {
        install: Some(InstallStep::new("requirements.txt", PIP_INSTALL)),
        ..ServiceEntry::new(name, dir, UVICORN_RELOAD, port)
    };

    vec![
        python_service("hub", "services/api", 8090),
        python_service("credit_appraisal", "agents/credit_appraisal", 8091),
        python_service("asset_appraisal", "agents/asset_appraisal", 8092),
        ServiceEntry {
            health_path: "/_stcore/health".to_string(),
            install: Some(InstallStep::new("requirements.txt", PIP_INSTALL)),
            enabled: false,
            ..ServiceEntry::new(
                "dashboard",
                "services/ui",
                "streamlit run app.py --server.port {port} --server.headless true",
                8501,
            )
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.log_dir, PathBuf::from(".logs"));
        assert_eq!(config.run_dir, PathBuf::from(".run"));
        assert_eq!(config.probe_host, "127.0.0.1");
        assert_eq!(config.install_failure, InstallFailurePolicy::Abort);
        assert!(!config.pattern_fallback);
        assert!(config.root.ends_with(DEFAULT_ROOT_NAME));

        let ports: Vec<u16> = config.services.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![8090, 8091, 8092, 8501]);
    }

    #[test]
    fn test_default_table_excludes_disabled_dashboard() {
        let config = OrchestratorConfig {
            root: PathBuf::from("/srv/hub"),
            ..OrchestratorConfig::default()
        };
        let specs = config.services(&[]).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["hub", "credit_appraisal", "asset_appraisal"]);

        let credit = &specs[1];
        assert_eq!(credit.port(), 8091);
        assert_eq!(
            credit.working_directory(),
            Path::new("/srv/hub/agents/credit_appraisal")
        );
        assert_eq!(
            credit.start_command(),
            "uvicorn main:app --host 0.0.0.0 --port 8091 --reload"
        );
        assert_eq!(credit.match_pattern(), credit.start_command());
        assert_eq!(credit.log_file(), Path::new("/srv/hub/.logs/credit_appraisal.log"));
        assert_eq!(credit.health_path(), "/health");
    }

    #[test]
    fn test_explicit_selection_includes_disabled_entries() {
        let config = OrchestratorConfig::default();
        let specs = config.services(&["dashboard".to_string()]).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].health_path(), "/_stcore/health");
        assert_eq!(
            specs[0].start_command(),
            "streamlit run app.py --server.port 8501 --server.headless true"
        );
    }

    #[test]
    fn test_unknown_and_duplicate_services_are_rejected() {
        let config = OrchestratorConfig::default();
        let err = config.services(&["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService(name) if name == "ghost"));

        let mut config = OrchestratorConfig::default();
        config.services.push(ServiceEntry::new("hub", "elsewhere", "run", 9000));
        let err = config.services(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateService(name) if name == "hub"));
    }

    #[test]
    fn test_templates_are_rendered() {
        let mut entry = ServiceEntry::new("credit", "agents/credit", "serve --port {port} --tag {name}", 8091);
        entry.match_pattern = Some("serve --port {port}".to_string());
        entry.env.insert("DATA_DIR".to_string(), "{root}/data".to_string());
        entry.install = Some(InstallStep::new("requirements.txt", "pip install --target {root}/deps"));

        let config = OrchestratorConfig {
            root: PathBuf::from("/opt/hub"),
            services: vec![entry],
            ..OrchestratorConfig::default()
        };
        let spec = &config.services(&[]).unwrap()[0];
        assert_eq!(spec.start_command(), "serve --port 8091 --tag credit");
        assert_eq!(spec.match_pattern(), "serve --port 8091");
        assert_eq!(spec.env().get("DATA_DIR").map(String::as_str), Some("/opt/hub/data"));
        assert_eq!(
            spec.install().map(|i| i.command.as_str()),
            Some("pip install --target /opt/hub/deps")
        );
    }

    #[test]
    fn test_load_from_file_with_root_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.toml");
        fs::write(
            &file,
            r#"
root = "/ignored"
initial_delay_ms = 10
pattern_fallback = true
install_failure = "skip"

[[services]]
name = "credit"
working_directory = "agents/credit"
start_command = "python -m credit --port {port}"
port = 9191
"#,
        )
        .unwrap();

        let config =
            OrchestratorConfig::load_with(Some(&file), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.initial_delay(), Duration::from_millis(10));
        assert!(config.pattern_fallback);
        assert_eq!(config.install_failure, InstallFailurePolicy::Skip);
        assert_eq!(config.readiness_timeout_ms, 30_000);

        let specs = config.services(&[]).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].start_command(), "python -m credit --port 9191");
        assert_eq!(specs[0].working_directory(), dir.path().join("agents/credit"));
    }

    #[test]
    fn test_root_config_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ROOT_CONFIG_FILE), "probe_host = \"localhost\"\n").unwrap();

        let config = OrchestratorConfig::load_with(None, Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.probe_host, "localhost");
        assert_eq!(config.log_dir(), dir.path().join(".logs"));
        assert_eq!(config.services.len(), 4);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = OrchestratorConfig::load_with(Some(&missing), None).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
