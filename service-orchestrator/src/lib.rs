//! Stops, launches and health-checks a fixed set of local HTTP services.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod runtime;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, RunReport};
pub use runtime::{LocalRuntime, ServiceRuntime};
