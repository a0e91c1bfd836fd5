//! Stopping services.
//!
//! Targets the PID the launcher recorded. Command-line pattern matching is
//! only used when `pattern_fallback` is enabled, and may hit unrelated
//! processes whose command line happens to contain the pattern.

use super::matcher::ProcessMatcher;
use super::pid_store::PidStore;
use crate::error::TerminateError;
use log::{debug, info, warn};
use serde::Serialize;
use service_model::{ProcessRecord, ServiceSpec};
use std::io;
use std::time::{Duration, Instant};

/// A recorded PID whose process started later than this after the record was
/// written belongs to someone else.
const PID_REUSE_SLACK_SECS: i64 = 5;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of stopping one service. Nothing running counts as a success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub service: String,
    /// PIDs (or process groups) that received SIGTERM.
    pub signalled: Vec<u32>,
    /// Still alive after the grace period, sent SIGKILL.
    pub forced: Vec<u32>,
    /// Signals the OS refused, or a [`TerminateError`] the caller tolerated.
    pub error: Option<String>,
}

impl StopReport {
    pub fn not_running(service: &str) -> Self {
        Self {
            service: service.to_string(),
            ..Self::default()
        }
    }

    pub fn failed(service: &str, error: &TerminateError) -> Self {
        Self {
            service: service.to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn was_running(&self) -> bool {
        !self.signalled.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn refused(&mut self, error: TerminateError) {
        let error = error.to_string();
        self.error = Some(match self.error.take() {
            Some(previous) => format!("{}; {}", previous, error),
            None => error,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Launcher-spawned process group, leader still running.
    Group(u32),
    /// Launcher-spawned process group whose leader is gone; members may
    /// still hold the port.
    Orphans(u32),
    /// Pattern match; signalled alone.
    Single(u32),
}

impl Target {
    fn pid(&self) -> u32 {
        match self {
            Target::Group(pid) | Target::Orphans(pid) | Target::Single(pid) => *pid,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Target::Group(pid) | Target::Single(pid) => ProcessMatcher::is_alive(*pid),
            Target::Orphans(pgid) => matches!(kill(-(*pgid as libc::pid_t), 0), Ok(true)),
        }
    }
}

type SignalFn = fn(Target, libc::c_int) -> Result<bool, TerminateError>;

pub struct Terminator {
    pid_store: PidStore,
    pattern_fallback: bool,
    stop_timeout: Duration,
    signal: SignalFn,
}

impl Terminator {
    pub fn new(pid_store: PidStore, pattern_fallback: bool, stop_timeout: Duration) -> Self {
        Self {
            pid_store,
            pattern_fallback,
            stop_timeout,
            signal,
        }
    }

    /// Sends SIGTERM to everything attributable to `spec`, waits up to the
    /// stop timeout, then SIGKILLs survivors and forgets the PID record.
    ///
    /// A signal the OS refuses does not end the stop: the remaining targets
    /// are still handled and the refusal is recorded in the report.
    pub async fn stop(&self, spec: &ServiceSpec) -> Result<StopReport, TerminateError> {
        let targets = self.targets(spec)?;
        if targets.is_empty() {
            info!("Terminator: '{}' is not running", spec.name());
            self.pid_store.clear(spec.name())?;
            return Ok(StopReport::not_running(spec.name()));
        }

        let mut report = StopReport::not_running(spec.name());
        for target in &targets {
            info!("Terminator: SIGTERM '{}' ({:?})", spec.name(), target);
            match (self.signal)(*target, libc::SIGTERM) {
                Ok(true) => report.signalled.push(target.pid()),
                Ok(false) => {}
                Err(e) => {
                    warn!("Terminator: '{}': {}", spec.name(), e);
                    report.refused(e);
                }
            }
        }

        let deadline = Instant::now() + self.stop_timeout;
        let mut alive = targets;
        loop {
            alive = still_alive(alive).await;
            if alive.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        for target in alive {
            warn!(
                "Terminator: '{}' ({:?}) still alive after {:?}, sending SIGKILL",
                spec.name(),
                target,
                self.stop_timeout
            );
            match (self.signal)(target, libc::SIGKILL) {
                Ok(true) => report.forced.push(target.pid()),
                Ok(false) => {}
                Err(e) => {
                    warn!("Terminator: '{}': {}", spec.name(), e);
                    report.refused(e);
                }
            }
        }

        self.pid_store.clear(spec.name())?;
        Ok(report)
    }

    fn targets(&self, spec: &ServiceSpec) -> Result<Vec<Target>, TerminateError> {
        let mut targets = Vec::new();

        if let Some(record) = self.pid_store.load(spec.name())? {
            match tracked_target(&record) {
                Some(target) => targets.push(target),
                None => debug!(
                    "Terminator: stale record for '{}' (PID {})",
                    spec.name(),
                    record.pid
                ),
            }
        }

        if self.pattern_fallback {
            for pid in ProcessMatcher::find(spec.match_pattern()) {
                if !targets.iter().any(|t| t.pid() == pid) {
                    debug!(
                        "Terminator: pattern '{}' matched PID {}",
                        spec.match_pattern(),
                        pid
                    );
                    targets.push(Target::Single(pid));
                }
            }
        }

        Ok(targets)
    }
}

/// `None` when the recorded PID now belongs to an unrelated process.
fn tracked_target(record: &ProcessRecord) -> Option<Target> {
    if record.pid <= 1 || record.pid == std::process::id() {
        return None;
    }
    match ProcessMatcher::start_time(record.pid) {
        Some(started) if (started as i64) <= record.started_at.timestamp() + PID_REUSE_SLACK_SECS => {
            Some(Target::Group(record.pid))
        }
        Some(_) => None,
        // The PID is free, so no new group can have taken its number.
        None => Some(Target::Orphans(record.pid)),
    }
}

/// Liveness checks refresh the process table, which blocks.
async fn still_alive(targets: Vec<Target>) -> Vec<Target> {
    let fallback = targets.clone();
    tokio::task::spawn_blocking(move || {
        targets.into_iter().filter(Target::is_alive).collect::<Vec<_>>()
    })
    .await
    .unwrap_or(fallback)
}

/// Returns `Ok(false)` when the process is already gone.
fn signal(target: Target, signal: libc::c_int) -> Result<bool, TerminateError> {
    let pid = target.pid();
    if pid <= 1 {
        return Ok(false);
    }
    let raw = pid as libc::pid_t;
    let delivered = match target {
        Target::Group(_) => match kill(-raw, signal) {
            // Not (or no longer) a group leader: fall back to the PID itself.
            Ok(false) => kill(raw, signal),
            other => other,
        },
        Target::Orphans(_) => kill(-raw, signal),
        Target::Single(_) => kill(raw, signal),
    };
    delivered.map_err(|source| TerminateError::Signal { pid, source })
}

fn kill(target: libc::pid_t, signal: libc::c_int) -> io::Result<bool> {
    // SAFETY: kill(2) takes plain integers and has no memory-safety requirements.
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_model::ProcessHandle;
    use std::os::unix::process::CommandExt;
    use std::process::{Child, Command, Stdio};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// PID whose signals are refused with EPERM, as for another user's process.
    static FOREIGN_PID: AtomicU32 = AtomicU32::new(0);

    fn signal_refusing_foreign(target: Target, sig: libc::c_int) -> Result<bool, TerminateError> {
        if target.pid() == FOREIGN_PID.load(Ordering::SeqCst) {
            return Err(TerminateError::Signal {
                pid: target.pid(),
                source: io::Error::from_raw_os_error(libc::EPERM),
            });
        }
        signal(target, sig)
    }

    fn spec(name: &str, pattern: &str) -> ServiceSpec {
        ServiceSpec::new(name, "/nonexistent", pattern, 8091, "/tmp/x.log", "/health")
            .with_match_pattern(pattern)
    }

    fn spawn_sleep(marker: &str) -> Child {
        Command::new("sleep")
            .arg(marker)
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap()
    }

    fn terminator(store: &PidStore, fallback: bool) -> Terminator {
        Terminator::new(store.clone(), fallback, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_stop_without_process_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let terminator = terminator(&store, true);
        let spec = spec("credit", "sleep 9191.5");

        let first = terminator.stop(&spec).await.unwrap();
        assert!(!first.was_running());
        // Stopping again observes the same outcome.
        let second = terminator.stop(&spec).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stop_tracked_process() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let mut child = spawn_sleep("7373.25");
        let handle = ProcessHandle::new("asset", child.id());
        store
            .record(&ProcessRecord::new(&handle, "sleep 7373.25", 8092))
            .unwrap();

        let report = terminator(&store, false)
            .stop(&spec("asset", "sleep 7373.25"))
            .await
            .unwrap();

        assert_eq!(report.signalled, vec![child.id()]);
        assert!(report.forced.is_empty());
        assert!(!ProcessMatcher::is_alive(child.id()));
        assert!(store.load("asset").unwrap().is_none());
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_stale_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let mut child = spawn_sleep("6161.75");
        let mut record = ProcessRecord::new(&ProcessHandle::new("hub", child.id()), "x", 8090);
        // Recorded long before the process with this PID started.
        record.started_at = record.started_at - chrono::Duration::hours(1);
        store.record(&record).unwrap();

        let report = terminator(&store, false)
            .stop(&spec("hub", "sleep 6161.75"))
            .await
            .unwrap();

        assert!(!report.was_running());
        assert!(ProcessMatcher::is_alive(child.id()));
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_pattern_fallback_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let mut child = spawn_sleep("5151.5");
        std::thread::sleep(Duration::from_millis(100));
        let spec = spec("credit", "sleep 5151.5");

        let report = terminator(&store, false).stop(&spec).await.unwrap();
        assert!(!report.was_running());
        assert!(ProcessMatcher::is_alive(child.id()));

        let report = terminator(&store, true).stop(&spec).await.unwrap();
        assert_eq!(report.signalled, vec![child.id()]);
        assert!(!ProcessMatcher::is_alive(child.id()));
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_sigterm_ignoring_process_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; while :; do sleep 1; done")
            .process_group(0)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        store
            .record(&ProcessRecord::new(
                &ProcessHandle::new("stubborn", child.id()),
                "sh",
                9000,
            ))
            .unwrap();

        let terminator = Terminator::new(store.clone(), false, Duration::from_millis(300));
        let report = terminator.stop(&spec("stubborn", "trap")).await.unwrap();

        assert_eq!(report.forced, vec![child.id()]);
        child.wait().unwrap();
        assert!(!ProcessMatcher::is_alive(child.id()));
    }

    #[tokio::test]
    async fn test_refused_signal_does_not_end_stop() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let mut foreign = spawn_sleep("8787.5");
        let mut own = spawn_sleep("8787.5");
        std::thread::sleep(Duration::from_millis(100));
        store
            .record(&ProcessRecord::new(
                &ProcessHandle::new("credit", own.id()),
                "sleep 8787.5",
                8091,
            ))
            .unwrap();
        FOREIGN_PID.store(foreign.id(), Ordering::SeqCst);

        let terminator = Terminator {
            signal: signal_refusing_foreign,
            ..Terminator::new(store.clone(), true, Duration::from_millis(300))
        };
        let report = terminator.stop(&spec("credit", "sleep 8787.5")).await.unwrap();

        assert!(!report.is_success());
        assert!(report
            .error
            .as_deref()
            .unwrap()
            .contains(&format!("PID {}", foreign.id())));
        assert_eq!(report.signalled, vec![own.id()]);
        assert!(!ProcessMatcher::is_alive(own.id()));
        assert!(store.load("credit").unwrap().is_none());

        assert!(ProcessMatcher::is_alive(foreign.id()));
        foreign.kill().unwrap();
        foreign.wait().unwrap();
        own.wait().unwrap();
    }

    #[tokio::test]
    async fn test_group_outliving_its_leader_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path());
        let mut leader = Command::new("sh")
            .arg("-c")
            .arg("sleep 5454.5 & exit 0")
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        leader.wait().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(ProcessMatcher::find("sleep 5454.5").len(), 1);
        store
            .record(&ProcessRecord::new(
                &ProcessHandle::new("hub", leader.id()),
                "sh",
                8090,
            ))
            .unwrap();

        let report = terminator(&store, false)
            .stop(&spec("hub", "sleep 5454.5"))
            .await
            .unwrap();

        assert_eq!(report.signalled, vec![leader.id()]);
        assert!(report.is_success());
        assert!(ProcessMatcher::find("sleep 5454.5").is_empty());
    }
}
