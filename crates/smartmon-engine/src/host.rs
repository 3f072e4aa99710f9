//! Operating-system collaborator.
//!
//! [`ProcessHost`] is everything the engine needs from the OS: enumerate
//! processes, sample one, signal it and read machine-wide metrics.  The engine
//! only ever talks to the trait, so the live [`SystemHost`] and the demo host
//! are interchangeable.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid as NixPid;
use smartmon_types::{LoadAverage, MonitorError};
use sysinfo::{Pid, System};
use tracing::debug;

/// Poll interval of [`SystemHost::wait_for_exit`].
const EXIT_POLL: Duration = Duration::from_millis(20);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Longest name the kernel keeps in `/proc/<pid>/comm`.
const COMM_MAX: usize = 15;

/// A process as returned by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub name: String,
    /// Numeric owner uid, when the OS reports one.
    pub owner: Option<u32>,
}

/// Live metrics for one process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveSample {
    /// CPU usage since the previous refresh, in percent of one core.
    pub cpu_percent: f64,
    /// Resident memory in MiB.
    pub memory_mb: f64,
}

/// Machine-wide metrics read on every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemMetrics {
    pub cpu_count: usize,
    pub cpu_percent: f64,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub load: LoadAverage,
}

/// Process enumeration, sampling and signalling.
pub trait ProcessHost {
    /// Take a fresh snapshot of the process table and system counters.
    fn refresh(&mut self);

    /// Every process in the last snapshot, ascending by pid.
    fn processes(&self) -> Vec<ProcessIdentity>;

    /// Sample one process from the last snapshot.
    ///
    /// # Errors
    ///
    /// [`MonitorError::NoSuchProcess`] when the pid has gone away,
    /// [`MonitorError::AccessDenied`] when it cannot be inspected.
    fn sample(&self, pid: u32) -> Result<LiveSample, MonitorError>;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&mut self, pid: u32) -> Result<(), MonitorError>;

    /// Kill the process unconditionally (SIGKILL).
    fn force_kill(&mut self, pid: u32) -> Result<(), MonitorError>;

    /// Block until the process is gone or `timeout` elapses.  Returns `true`
    /// if it exited in time.
    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> Result<bool, MonitorError>;

    fn system_metrics(&self) -> SystemMetrics;
}

// ────────────────────────────────────────────────────────────────────────────
// SystemHost
// ────────────────────────────────────────────────────────────────────────────

/// [`ProcessHost`] backed by `sysinfo` for inspection and `nix` for signals.
pub struct SystemHost {
    sys: System,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHost {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self { sys }
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), MonitorError> {
        let target = to_nix_pid(pid)?;
        if pid == std::process::id() {
            return Err(MonitorError::AccessDenied { pid });
        }
        debug!(pid, ?signal, "sending signal");
        kill(target, signal).map_err(|errno| map_errno(pid, errno))
    }
}

impl ProcessHost for SystemHost {
    fn refresh(&mut self) {
        self.sys.refresh_processes();
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
    }

    fn processes(&self) -> Vec<ProcessIdentity> {
        let mut out: Vec<ProcessIdentity> = self
            .sys
            .processes()
            .iter()
            .map(|(pid, proc_)| ProcessIdentity {
                pid: pid.as_u32(),
                name: full_name(proc_.name(), proc_.cmd(), proc_.exe()),
                owner: proc_.user_id().map(|uid| **uid),
            })
            .collect();
        out.sort_by_key(|p| p.pid);
        out
    }

    fn sample(&self, pid: u32) -> Result<LiveSample, MonitorError> {
        let proc_ = self
            .sys
            .process(Pid::from_u32(pid))
            .ok_or(MonitorError::NoSuchProcess { pid })?;
        Ok(LiveSample {
            cpu_percent: f64::from(proc_.cpu_usage()),
            memory_mb: proc_.memory() as f64 / BYTES_PER_MB,
        })
    }

    fn terminate(&mut self, pid: u32) -> Result<(), MonitorError> {
        self.signal(pid, Signal::SIGTERM)
    }

    fn force_kill(&mut self, pid: u32) -> Result<(), MonitorError> {
        self.signal(pid, Signal::SIGKILL)
    }

    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> Result<bool, MonitorError> {
        let target = to_nix_pid(pid)?;
        let deadline = Instant::now() + timeout;
        loop {
            match kill(target, None) {
                Err(Errno::ESRCH) => return Ok(true),
                // Still present, just not ours to signal.
                Ok(()) | Err(Errno::EPERM) => {}
                Err(errno) => return Err(map_errno(pid, errno)),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(EXIT_POLL.min(deadline - now));
        }
    }

    fn system_metrics(&self) -> SystemMetrics {
        let load = System::load_average();
        SystemMetrics {
            cpu_count: self.sys.cpus().len(),
            cpu_percent: f64::from(self.sys.global_cpu_info().cpu_usage()),
            memory_total_bytes: self.sys.total_memory(),
            memory_used_bytes: self.sys.used_memory(),
            load: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
        }
    }
}

/// Recover a process name the kernel cut to [`COMM_MAX`] bytes.
///
/// The basename of `argv[0]`, then of the executable path, replaces the short
/// name when it extends it.  Anything else keeps the kernel's name.
fn full_name(comm: &str, cmd: &[String], exe: Option<&Path>) -> String {
    if comm.len() >= COMM_MAX {
        let candidates = cmd.first().map(Path::new).into_iter().chain(exe);
        for path in candidates {
            if let Some(base) = path.file_name().and_then(|n| n.to_str())
                && base.len() > comm.len()
                && base.starts_with(comm)
            {
                return base.to_string();
            }
        }
    }
    comm.to_string()
}

/// Pid 0 and anything past `i32::MAX` would address process groups, not a
/// single process.
fn to_nix_pid(pid: u32) -> Result<NixPid, MonitorError> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(NixPid::from_raw(raw)),
        _ => Err(MonitorError::NoSuchProcess { pid }),
    }
}

fn map_errno(pid: u32, errno: Errno) -> MonitorError {
    match errno {
        Errno::ESRCH => MonitorError::NoSuchProcess { pid },
        Errno::EPERM => MonitorError::AccessDenied { pid },
        other => MonitorError::Signal {
            pid,
            details: other.desc().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_addressing_pids_are_rejected() {
        assert_eq!(
            to_nix_pid(0).unwrap_err(),
            MonitorError::NoSuchProcess { pid: 0 }
        );
        assert!(to_nix_pid(u32::MAX).is_err());
        assert_eq!(to_nix_pid(42).unwrap(), NixPid::from_raw(42));
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(
            map_errno(5, Errno::ESRCH),
            MonitorError::NoSuchProcess { pid: 5 }
        );
        assert_eq!(
            map_errno(5, Errno::EPERM),
            MonitorError::AccessDenied { pid: 5 }
        );
        assert!(matches!(
            map_errno(5, Errno::EINVAL),
            MonitorError::Signal { pid: 5, .. }
        ));
    }

    #[test]
    fn system_host_sees_itself() {
        let mut host = SystemHost::new();
        host.refresh();
        let me = std::process::id();
        let procs = host.processes();
        assert!(procs.windows(2).all(|w| w[0].pid < w[1].pid));
        assert!(procs.iter().any(|p| p.pid == me));
        let sample = host.sample(me).expect("own process is sampleable");
        assert!(sample.memory_mb > 0.0);
    }

    #[test]
    fn system_host_refuses_to_signal_itself() {
        let mut host = SystemHost::new();
        let me = std::process::id();
        assert_eq!(
            host.terminate(me).unwrap_err(),
            MonitorError::AccessDenied { pid: me }
        );
    }

    #[test]
    fn wait_for_exit_times_out_on_live_process() {
        let mut host = SystemHost::new();
        let exited = host
            .wait_for_exit(std::process::id(), Duration::from_millis(30))
            .unwrap();
        assert!(!exited);
    }

    #[test]
    fn terminate_and_reap_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id();
        let mut host = SystemHost::new();
        host.terminate(pid).expect("SIGTERM delivered");
        // The child stays a zombie until reaped, so reap it before checking.
        child.wait().expect("reap child");
        assert!(host.wait_for_exit(pid, Duration::from_millis(200)).unwrap());
    }

    #[test]
    fn truncated_comm_is_extended_from_argv0() {
        let cmd = vec!["/opt/bin/xmrig-monitor-helper".to_string(), "-q".to_string()];
        assert_eq!(full_name("xmrig-monitor-h", &cmd, None), "xmrig-monitor-helper");
    }

    #[test]
    fn truncated_comm_falls_back_to_exe() {
        let cmd = vec!["worker".to_string()];
        let exe = Path::new("/usr/lib/thunderbird-crash-reporter");
        assert_eq!(
            full_name("thunderbird-cra", &cmd, Some(exe)),
            "thunderbird-crash-reporter"
        );
    }

    #[test]
    fn unrelated_or_short_names_are_kept() {
        let cmd = vec!["/usr/bin/python3".to_string()];
        assert_eq!(full_name("kworker/0:1-eve", &cmd, None), "kworker/0:1-eve");
        assert_eq!(full_name("sleep", &["/bin/sleep-longer".to_string()], None), "sleep");
        assert_eq!(full_name("xmrig-monitor-h", &[], None), "xmrig-monitor-h");
    }

    fn sleep_binary() -> &'static str {
        ["/bin/sleep", "/usr/bin/sleep"]
            .into_iter()
            .find(|p| Path::new(p).exists())
            .expect("sleep binary")
    }

    #[test]
    fn system_host_reports_full_long_name() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let link = dir.path().join("xmrig-monitor-helper");
        std::os::unix::fs::symlink(sleep_binary(), &link).expect("symlink");
        let mut child = std::process::Command::new(&link)
            .arg("30")
            .spawn()
            .expect("spawn long-named sleep");
        let pid = child.id();

        let mut host = SystemHost::new();
        host.refresh();
        let name = host
            .processes()
            .into_iter()
            .find(|p| p.pid == pid)
            .map(|p| p.name);

        child.kill().expect("kill child");
        child.wait().expect("reap child");
        assert_eq!(name.as_deref(), Some("xmrig-monitor-helper"));
    }

    #[test]
    fn sequencer_escalates_against_term_ignoring_child() {
        use crate::cancel::CancelToken;
        use crate::sequencer::{SequenceOutcome, TerminationSequencer};
        use smartmon_types::{KillPath, ProcessRecord};

        let mut child = std::process::Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .spawn()
            .expect("spawn sh");
        let pid = child.id();
        // SIGTERM must not arrive before the trap is installed.
        let comm = format!("/proc/{pid}/comm");
        let deadline = Instant::now() + Duration::from_secs(5);
        while std::fs::read_to_string(&comm).map_or(true, |c| c.trim() != "sleep") {
            assert!(Instant::now() < deadline, "child never reached sleep");
            thread::sleep(Duration::from_millis(10));
        }

        let mut host = SystemHost::new();
        let mut seq = TerminationSequencer::new(Duration::ZERO, Duration::from_millis(150));
        let mut target = ProcessRecord::new(pid, "sleep", 0.0, 1.0);
        target.blocklisted = true;
        let outcome = seq.execute(&target, &[], &mut host, &CancelToken::new(), &mut |_, _, _| {});

        let status = child.wait().expect("reap child");
        assert_eq!(outcome, SequenceOutcome::Killed(KillPath::Escalated));
        assert!(!status.success());
    }

    #[test]
    fn metrics_are_populated() {
        let mut host = SystemHost::new();
        host.refresh();
        let m = host.system_metrics();
        assert!(m.cpu_count >= 1);
        assert!(m.memory_total_bytes >= m.memory_used_bytes);
    }
}
