//! Run summaries, for humans (table) and automation (JSON + exit code).

use crate::process::StopReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_model::HealthResult;
use std::fmt::Write;

/// Every selected service is healthy.
pub const EXIT_HEALTHY: u8 = 0;
/// The run completed but some service was skipped or is unhealthy.
pub const EXIT_DEGRADED: u8 = 1;
/// The run could not complete (configuration, install failure under `abort`, I/O).
pub const EXIT_FATAL: u8 = 2;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaunchStatus {
    Launched { pid: u32 },
    Skipped { reason: String },
    /// `status` runs never launch anything.
    NotAttempted,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ServiceRow {
    pub name: String,
    pub port: u16,
    pub launch: LaunchStatus,
    pub health: HealthResult,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunReport {
    pub finished_at: DateTime<Utc>,
    pub services: Vec<ServiceRow>,
}

impl RunReport {
    pub fn new(services: Vec<ServiceRow>) -> Self {
        Self {
            finished_at: Utc::now(),
            services,
        }
    }

    pub fn row(&self, name: &str) -> Option<&ServiceRow> {
        self.services.iter().find(|row| row.name == name)
    }

    pub fn healthy_count(&self) -> usize {
        self.services.iter().filter(|row| row.health.reachable).count()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy_count() == self.services.len()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_healthy() {
            EXIT_HEALTHY
        } else {
            EXIT_DEGRADED
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<20} | {:<5} | {:<8} | {}", "NAME", "PORT", "PID", "HEALTH");
        let _ = writeln!(out, "{:-<20}-+-{:-<5}-+-{:-<8}-+-{:-<24}", "", "", "", "");
        for row in &self.services {
            let pid = match &row.launch {
                LaunchStatus::Launched { pid } => pid.to_string(),
                _ => "-".to_string(),
            };
            let _ = writeln!(
                out,
                "{:<20} | {:<5} | {:<8} | {}",
                row.name,
                row.port,
                pid,
                health_column(row)
            );
        }
        let _ = writeln!(
            out,
            "{}/{} services healthy",
            self.healthy_count(),
            self.services.len()
        );
        out
    }
}

fn health_column(row: &ServiceRow) -> String {
    if row.health.reachable {
        return "healthy".to_string();
    }
    if let LaunchStatus::Skipped { reason } = &row.launch {
        return format!("skipped: {}", reason);
    }
    match (&row.health.status_code, &row.health.error) {
        (_, Some(error)) => format!("unreachable: {}", error),
        (Some(code), None) => format!("unhealthy: HTTP {}", code),
        (None, None) => "unreachable".to_string(),
    }
}

pub fn stop_exit_code(reports: &[StopReport]) -> u8 {
    if reports.iter().all(StopReport::is_success) {
        EXIT_HEALTHY
    } else {
        EXIT_DEGRADED
    }
}

pub fn render_stop_reports(reports: &[StopReport]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<20} | {}", "NAME", "STOP");
    let _ = writeln!(out, "{:-<20}-+-{:-<24}", "", "");
    for report in reports {
        let state = if let Some(error) = &report.error {
            format!("failed: {}", error)
        } else if !report.was_running() {
            "not running".to_string()
        } else if report.forced.is_empty() {
            format!("stopped {:?}", report.signalled)
        } else {
            format!("stopped {:?} (killed {:?})", report.signalled, report.forced)
        };
        let _ = writeln!(out, "{:<20} | {}", report.service, state);
    }
    out
}
