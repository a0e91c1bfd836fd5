pub mod launcher;
pub mod matcher;
pub mod pid_store;
pub mod terminator;

pub use launcher::{LaunchOutcome, Launcher};
pub use matcher::ProcessMatcher;
pub use pid_store::PidStore;
pub use terminator::{StopReport, Terminator};
