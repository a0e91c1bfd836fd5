//! Process discovery over the OS process table.

use std::ffi::OsStr;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Finds processes by command line and answers liveness questions.
///
/// Zombies are reported as dead: they hold no port and cannot be signalled
/// into exiting any further.
pub struct ProcessMatcher;

impl ProcessMatcher {
    /// PIDs whose space-joined command line contains `pattern`.
    ///
    /// The calling process is never part of the result and an empty pattern
    /// matches nothing.
    pub fn find(pattern: &str) -> Vec<u32> {
        if pattern.trim().is_empty() {
            return Vec::new();
        }

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );

        let own = std::process::id();
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(pid, process)| {
                pid.as_u32() != own
                    && process.thread_kind().is_none()
                    && process.status() != ProcessStatus::Zombie
                    && command_line_matches(process.cmd(), pattern)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    pub fn is_alive(pid: u32) -> bool {
        Self::start_time(pid).is_some()
    }

    /// Start time (seconds since the epoch) of a live, non-zombie process.
    pub fn start_time(pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new(),
        );
        system
            .process(pid)
            .filter(|process| process.status() != ProcessStatus::Zombie)
            .map(|process| process.start_time())
    }
}

/// Substring match against the arguments joined with single spaces.
pub fn command_line_matches<S: AsRef<OsStr>>(cmd: &[S], pattern: &str) -> bool {
    if pattern.is_empty() || cmd.is_empty() {
        return false;
    }
    let joined = cmd
        .iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    joined.contains(pattern)
}
