pub mod agent;
pub mod health;
pub mod process;
pub mod service;

pub use agent::RunResponse;
pub use health::{HealthReport, HealthResult};
pub use process::{ProcessHandle, ProcessRecord};
pub use service::{InstallStep, ServiceSpec};
