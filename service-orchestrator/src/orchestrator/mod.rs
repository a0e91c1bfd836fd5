//! # Orchestrator
//!
//! Runs the lifecycle stages over a fixed list of services:
//!
//! `STOP_ALL → LAUNCH(service) for each → PROBE_ALL`
//!
//! Stages are strictly ordered and there is no rollback. A skipped service
//! does not stop the others; a [`LaunchError`] ends the run and leaves every
//! service stopped by `STOP_ALL` down.

pub mod report;

pub use report::{LaunchStatus, RunReport, ServiceRow};

use crate::error::LaunchError;
use crate::process::{LaunchOutcome, StopReport};
use crate::runtime::ServiceRuntime;
use futures::future::join_all;
use log::{error, info, warn};
use service_model::{HealthResult, ServiceSpec};
use std::sync::Arc;

pub struct Orchestrator<R: ServiceRuntime> {
    runtime: Arc<R>,
    services: Vec<ServiceSpec>,
}

impl<R: ServiceRuntime> Orchestrator<R> {
    pub fn new(runtime: Arc<R>, services: Vec<ServiceSpec>) -> Self {
        Self { runtime, services }
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    /// Stops every service. Failures are logged and reported, never fatal.
    pub async fn stop_all(&self) -> Vec<StopReport> {
        info!("Orchestrator: STOP_ALL ({} services)", self.services.len());
        let mut reports = Vec::with_capacity(self.services.len());
        for spec in &self.services {
            match self.runtime.stop(spec).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("Orchestrator: stopping '{}' failed: {}", spec.name(), e);
                    reports.push(StopReport::failed(spec.name(), &e));
                }
            }
        }
        reports
    }

    /// The full cycle.
    pub async fn up(&self) -> Result<RunReport, LaunchError> {
        self.stop_all().await;

        info!("Orchestrator: LAUNCH ({} services)", self.services.len());
        let mut outcomes = Vec::with_capacity(self.services.len());
        for (idx, spec) in self.services.iter().enumerate() {
            match self.runtime.launch(spec).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let left_down: Vec<&str> =
                        self.services[idx..].iter().map(|s| s.name()).collect();
                    error!(
                        "Orchestrator: aborting run ({}); left stopped: {}",
                        e,
                        left_down.join(", ")
                    );
                    return Err(e);
                }
            }
        }

        info!("Orchestrator: PROBE_ALL");
        let health = join_all(
            self.services
                .iter()
                .zip(&outcomes)
                .map(|(spec, outcome)| self.readiness(spec, outcome)),
        )
        .await;

        let rows = self
            .services
            .iter()
            .zip(outcomes)
            .zip(health)
            .map(|((spec, outcome), health)| ServiceRow {
                name: spec.name().to_string(),
                port: spec.port(),
                launch: match outcome {
                    LaunchOutcome::Launched(handle) => LaunchStatus::Launched { pid: handle.pid() },
                    LaunchOutcome::Skipped { reason } => LaunchStatus::Skipped { reason },
                },
                health,
            })
            .collect();

        let report = RunReport::new(rows);
        info!(
            "Orchestrator: {}/{} services healthy",
            report.healthy_count(),
            report.services.len()
        );
        Ok(report)
    }

    /// One probe per service; nothing is stopped or launched.
    pub async fn status(&self) -> RunReport {
        let health = join_all(self.services.iter().map(|spec| self.runtime.probe(spec))).await;
        RunReport::new(
            self.services
                .iter()
                .zip(health)
                .map(|(spec, health)| ServiceRow {
                    name: spec.name().to_string(),
                    port: spec.port(),
                    launch: LaunchStatus::NotAttempted,
                    health,
                })
                .collect(),
        )
    }

    async fn readiness(&self, spec: &ServiceSpec, outcome: &LaunchOutcome) -> HealthResult {
        match outcome {
            LaunchOutcome::Launched(handle) => self.runtime.await_ready(spec, handle).await,
            LaunchOutcome::Skipped { reason } => {
                HealthResult::unreachable(spec.name(), format!("skipped: {}", reason))
            }
        }
    }
}
