use crate::config::OrchestratorConfig;
use crate::process::ProcessMatcher;
use log::{debug, info, warn};
use service_model::{HealthResult, ProcessHandle, ServiceSpec};
use std::time::Duration;
use tokio::time::Instant;

/// HTTP health checks against each service's health path.
pub struct HealthProber {
    client: reqwest::Client,
    host: String,
    initial_delay: Duration,
    poll_interval: Duration,
    readiness_timeout: Duration,
}

impl HealthProber {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            host: config.probe_host.clone(),
            initial_delay: config.initial_delay(),
            poll_interval: config.poll_interval(),
            readiness_timeout: config.readiness_timeout(),
        })
    }

    /// One GET, bounded by the probe timeout. Never fails: transport errors
    /// become `reachable=false`.
    pub async fn probe(&self, spec: &ServiceSpec) -> HealthResult {
        let url = spec.health_url(&self.host);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                debug!("Prober: {} -> {}", url, status);
                HealthResult::answered(spec.name(), status, body)
            }
            Err(e) => {
                debug!("Prober: {} unreachable: {}", url, e);
                HealthResult::unreachable(spec.name(), e.to_string())
            }
        }
    }

    /// Waits for the first healthy answer.
    ///
    /// Gives up when the readiness timeout elapses or, if a handle is given,
    /// as soon as that process is no longer alive.
    pub async fn await_ready(
        &self,
        spec: &ServiceSpec,
        handle: Option<&ProcessHandle>,
    ) -> HealthResult {
        tokio::time::sleep(self.initial_delay).await;
        let deadline = Instant::now() + self.readiness_timeout;

        loop {
            let result = self.probe(spec).await;
            if result.reachable {
                info!("Prober: '{}' is healthy", spec.name());
                return result;
            }

            if let Some(handle) = handle {
                if !process_alive(handle.pid()).await {
                    warn!(
                        "Prober: '{}' (PID {}) exited before becoming healthy, see {}",
                        spec.name(),
                        handle.pid(),
                        spec.log_file().display()
                    );
                    return HealthResult {
                        error: Some(format!(
                            "process {} exited before becoming healthy",
                            handle.pid()
                        )),
                        ..result
                    };
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    "Prober: '{}' not healthy after {:?}",
                    spec.name(),
                    self.readiness_timeout
                );
                let last = result.error.clone().or_else(|| {
                    result.status_code.map(|code| format!("HTTP {}", code))
                });
                return HealthResult {
                    error: Some(match last {
                        Some(last) => format!(
                            "not healthy after {:?} (last: {})",
                            self.readiness_timeout, last
                        ),
                        None => format!("not healthy after {:?}", self.readiness_timeout),
                    }),
                    ..result
                };
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// The liveness check refreshes the process table, which blocks. A failed
/// check counts as alive so polling continues until the timeout.
async fn process_alive(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || ProcessMatcher::is_alive(pid))
        .await
        .unwrap_or(true)
}
