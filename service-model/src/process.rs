use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OS process spawned for a service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProcessHandle {
    service: String,
    pid: u32,
}

impl ProcessHandle {
    pub fn new(service: impl Into<String>, pid: u32) -> Self {
        Self {
            service: service.into(),
            pid,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// What the launcher persists so a later run can find the process again.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessRecord {
    pub service: String,
    pub pid: u32,
    pub command: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn new(handle: &ProcessHandle, command: &str, port: u16) -> Self {
        Self {
            service: handle.service().to_string(),
            pid: handle.pid(),
            command: command.to_string(),
            port,
            started_at: Utc::now(),
        }
    }
}
