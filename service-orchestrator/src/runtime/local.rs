use crate::config::OrchestratorConfig;
use crate::error::{LaunchError, TerminateError};
use crate::process::{LaunchOutcome, Launcher, PidStore, StopReport, Terminator};
use crate::runtime::health::HealthProber;
use crate::runtime::traits::ServiceRuntime;
use async_trait::async_trait;
use service_model::{HealthResult, ProcessHandle, ServiceSpec};

/// Manages services as processes on the local machine.
pub struct LocalRuntime {
    terminator: Terminator,
    launcher: Launcher,
    prober: HealthProber,
}

impl LocalRuntime {
    pub fn new(terminator: Terminator, launcher: Launcher, prober: HealthProber) -> Self {
        Self {
            terminator,
            launcher,
            prober,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, reqwest::Error> {
        let pid_store = PidStore::new(config.run_dir());
        Ok(Self::new(
            Terminator::new(
                pid_store.clone(),
                config.pattern_fallback,
                config.stop_timeout(),
            ),
            Launcher::new(
                pid_store,
                config.install_failure,
                config.append_logs,
                config.probe_host.clone(),
            ),
            HealthProber::new(config)?,
        ))
    }
}

#[async_trait]
impl ServiceRuntime for LocalRuntime {
    async fn stop(&self, spec: &ServiceSpec) -> Result<StopReport, TerminateError> {
        self.terminator.stop(spec).await
    }

    async fn launch(&self, spec: &ServiceSpec) -> Result<LaunchOutcome, LaunchError> {
        self.launcher.launch(spec).await
    }

    async fn await_ready(&self, spec: &ServiceSpec, handle: &ProcessHandle) -> HealthResult {
        self.prober.await_ready(spec, Some(handle)).await
    }

    async fn probe(&self, spec: &ServiceSpec) -> HealthResult {
        self.prober.probe(spec).await
    }
}
