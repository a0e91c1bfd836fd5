use crate::error::{LaunchError, TerminateError};
use crate::process::{LaunchOutcome, StopReport};
use async_trait::async_trait;
use service_model::{HealthResult, ProcessHandle, ServiceSpec};

/// The hands of the orchestrator.
///
/// The orchestrator only sequences calls on this trait, so it can be driven
/// by a mock in tests.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Stops whatever is attributable to the service. Nothing running is a success.
    async fn stop(&self, spec: &ServiceSpec) -> Result<StopReport, TerminateError>;

    /// Starts the service detached and returns without waiting for readiness.
    async fn launch(&self, spec: &ServiceSpec) -> Result<LaunchOutcome, LaunchError>;

    /// Resolves once the service first answers healthy, or with
    /// `reachable=false` once the readiness timeout elapses.
    async fn await_ready(&self, spec: &ServiceSpec, handle: &ProcessHandle) -> HealthResult;

    /// A single health check.
    async fn probe(&self, spec: &ServiceSpec) -> HealthResult;
}
