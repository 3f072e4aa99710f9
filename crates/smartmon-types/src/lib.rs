use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kernel flag bit set when a CPU spike is predicted.
pub const FLAG_CPU_SPIKE_PREDICTED: u32 = 1 << 0;
/// Kernel flag bit set when a memory spike is predicted.
pub const FLAG_MEM_SPIKE_PREDICTED: u32 = 1 << 1;
/// Kernel flag bit set when an I/O spike is predicted.
pub const FLAG_IO_SPIKE_PREDICTED: u32 = 1 << 2;
/// Kernel flag bit set while the scheduler actively tracks the process.
pub const FLAG_ACTIVE: u32 = 1 << 7;

/// Number of consecutive non-normal polls after which a process counts as a
/// persistent spiker in the advisory summary.
pub const PERSISTENT_SPIKE_POLLS: u32 = 5;

// ────────────────────────────────────────────────────────────────────────────
// Predictive telemetry
// ────────────────────────────────────────────────────────────────────────────

/// The three independent spike predictions exported per process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpikeFlags {
    pub cpu: bool,
    pub mem: bool,
    pub io: bool,
}

impl SpikeFlags {
    /// `true` when at least one metric is predicted to spike.
    pub fn any(&self) -> bool {
        self.cpu || self.mem || self.io
    }
}

/// EMA and rate-of-change statistics for one process.
///
/// Absent telemetry is represented by [`TelemetryStats::default`] (all zero),
/// never by a missing value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub cpu_ema: i64,
    pub mem_ema: i64,
    pub io_ema: i64,
    pub cpu_roc: i64,
    pub mem_roc: i64,
    pub io_roc: i64,
    /// Number of samples the scheduler has taken for this pid (0 if unknown).
    pub samples: u64,
}

impl TelemetryStats {
    /// Largest absolute rate-of-change across CPU, memory and I/O.
    pub fn max_roc_magnitude(&self) -> u64 {
        self.cpu_roc
            .unsigned_abs()
            .max(self.mem_roc.unsigned_abs())
            .max(self.io_roc.unsigned_abs())
    }
}

/// One row of the scheduler's prediction table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub spikes: SpikeFlags,
    /// Raw scheduler flag word; opaque to the monitor.
    pub flags: u32,
}

/// Aggregate counters from the scheduler status file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub tracked: u64,
    pub predictions: u64,
}

/// Everything the telemetry source knows for one poll, keyed by pid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub predictions: HashMap<u32, Prediction>,
    pub stats: HashMap<u32, TelemetryStats>,
}

impl TelemetryFrame {
    /// A frame with no predictions; used in degraded-telemetry mode.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty() && self.stats.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

/// Alert severity of a process.
///
/// Ordering for display is given by [`Severity::rank`]: `Critical` sorts
/// first, `Normal` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
    Warning,
    Critical,
}

impl Severity {
    /// Sort rank: 0 for `Critical` up to 5 for `Normal`.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Warning => 4,
            Severity::Normal => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Normal => "NORMAL",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn is_normal(self) -> bool {
        self == Severity::Normal
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Direction of the CPU rate-of-change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Flat,
}

impl Trend {
    pub fn from_roc(cpu_roc: i64) -> Self {
        match cpu_roc {
            r if r > 0 => Trend::Rising,
            r if r < 0 => Trend::Falling,
            _ => Trend::Flat,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Trend::Rising => "↑",
            Trend::Falling => "↓",
            Trend::Flat => "→",
        }
    }
}

/// Fused per-process risk record produced once per poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub spikes: SpikeFlags,
    pub stats: TelemetryStats,
    pub flags: u32,
    pub severity: Severity,
    pub trend: Trend,
    pub blocklisted: bool,
    pub safe: bool,
    pub consecutive_spikes: u32,
}

impl ProcessRecord {
    /// A record with live metrics only and every derived field at its
    /// neutral value.
    pub fn new(pid: u32, name: impl Into<String>, cpu_percent: f64, memory_mb: f64) -> Self {
        Self {
            pid,
            name: name.into(),
            cpu_percent,
            memory_mb,
            spikes: SpikeFlags::default(),
            stats: TelemetryStats::default(),
            flags: 0,
            severity: Severity::Normal,
            trend: Trend::Flat,
            blocklisted: false,
            safe: false,
            consecutive_spikes: 0,
        }
    }

    /// Rows that must always be shown, regardless of the row cap.
    pub fn is_interesting(&self) -> bool {
        !self.severity.is_normal()
            || self.spikes.any()
            || self.blocklisted
            || self.cpu_percent > 1.0
    }

    /// Blocklisted and not safe-listed.
    pub fn is_enforcement_target(&self) -> bool {
        self.blocklisted && !self.safe
    }
}

// ────────────────────────────────────────────────────────────────────────────
// System snapshot
// ────────────────────────────────────────────────────────────────────────────

/// AC / battery state. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    AcPower,
    Battery { capacity: Option<u8> },
    #[default]
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::AcPower => write!(f, "AC Power"),
            PowerState::Battery { capacity: Some(c) } => write!(f, "Battery ({c}%)"),
            PowerState::Battery { capacity: None } => write!(f, "Battery"),
            PowerState::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Latest aggregate machine metrics. No history is retained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_count: usize,
    pub cpu_percent: f64,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub memory_percent: f64,
    pub load: LoadAverage,
    pub power_state: PowerState,
    pub telemetry_available: bool,
    pub tracked_processes: u64,
    pub total_predictions: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Enforcement events
// ────────────────────────────────────────────────────────────────────────────

/// How a terminated process went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillPath {
    /// Exited within the timeout after the graceful terminate request.
    Graceful,
    /// Still alive after the timeout; forcefully killed.
    Escalated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Killed { path: KillPath, cpu_percent: f64 },
    Failed { reason: String },
}

/// One entry of the in-memory enforcement log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforcementEvent {
    pub at: DateTime<Local>,
    pub pid: u32,
    pub name: String,
    pub kind: EventKind,
}

impl fmt::Display for EnforcementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.at.format("%H:%M:%S");
        match &self.kind {
            EventKind::Killed { path, cpu_percent } => {
                let how = match path {
                    KillPath::Graceful => "terminated",
                    KillPath::Escalated => "killed",
                };
                write!(
                    f,
                    "[{ts}] ✓ {how} PID {} ({}) – CPU was {cpu_percent:.1}%",
                    self.pid, self.name
                )
            }
            EventKind::Failed { reason } => write!(
                f,
                "[{ts}] Failed to kill PID {} ({}): {reason}",
                self.pid, self.name
            ),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MonitorError {
    #[error("no such process: {pid}")]
    NoSuchProcess { pid: u32 },

    #[error("access denied to process {pid}")]
    AccessDenied { pid: u32 },

    #[error("signal delivery to {pid} failed: {details}")]
    Signal { pid: u32, details: String },

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_rank_puts_critical_first() {
        let mut all = vec![
            Severity::Normal,
            Severity::Warning,
            Severity::Low,
            Severity::Critical,
            Severity::Medium,
            Severity::High,
        ];
        all.sort_by_key(|s| s.rank());
        assert_eq!(
            all,
            vec![
                Severity::Critical,
                Severity::High,
                Severity::Medium,
                Severity::Low,
                Severity::Warning,
                Severity::Normal,
            ]
        );
    }

    #[test]
    fn severity_serializes_as_upper_case() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let back: Severity = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(back, Severity::Warning);
    }

    #[test]
    fn trend_follows_roc_sign() {
        assert_eq!(Trend::from_roc(12), Trend::Rising);
        assert_eq!(Trend::from_roc(-1), Trend::Falling);
        assert_eq!(Trend::from_roc(0), Trend::Flat);
    }

    #[test]
    fn max_roc_magnitude_uses_absolute_values() {
        let stats = TelemetryStats {
            cpu_roc: 200,
            mem_roc: -3500,
            io_roc: 1200,
            ..Default::default()
        };
        assert_eq!(stats.max_roc_magnitude(), 3500);
    }

    #[test]
    fn max_roc_magnitude_handles_i64_min() {
        let stats = TelemetryStats {
            io_roc: i64::MIN,
            ..Default::default()
        };
        assert_eq!(stats.max_roc_magnitude(), i64::MIN.unsigned_abs());
    }

    #[test]
    fn quiet_record_is_not_interesting() {
        let rec = ProcessRecord::new(1, "idle", 0.5, 10.0);
        assert!(!rec.is_interesting());
    }

    #[test]
    fn interesting_conditions() {
        let mut busy = ProcessRecord::new(1, "busy", 1.5, 10.0);
        assert!(busy.is_interesting());
        busy.cpu_percent = 1.0;
        assert!(!busy.is_interesting(), "exactly 1.0% is not above the bar");

        let mut spiking = ProcessRecord::new(2, "spiky", 0.0, 1.0);
        spiking.spikes.io = true;
        assert!(spiking.is_interesting());

        let mut listed = ProcessRecord::new(3, "miner", 0.0, 1.0);
        listed.blocklisted = true;
        assert!(listed.is_interesting());

        let mut low = ProcessRecord::new(4, "low", 0.0, 1.0);
        low.severity = Severity::Low;
        assert!(low.is_interesting());
    }

    #[test]
    fn safe_record_is_never_an_enforcement_target() {
        let mut rec = ProcessRecord::new(7, "sshd", 99.0, 4.0);
        rec.blocklisted = true;
        rec.safe = true;
        assert!(!rec.is_enforcement_target());
    }

    #[test]
    fn event_display_mentions_pid_and_reason() {
        let ev = EnforcementEvent {
            at: Local::now(),
            pid: 4242,
            name: "stress-ng".to_string(),
            kind: EventKind::Failed {
                reason: "access denied to process 4242".to_string(),
            },
        };
        let line = ev.to_string();
        assert!(line.contains("4242"));
        assert!(line.contains("stress-ng"));
        assert!(line.contains("access denied"));
    }

    #[test]
    fn killed_event_reports_cpu() {
        let ev = EnforcementEvent {
            at: Local::now(),
            pid: 1,
            name: "cryptominer".to_string(),
            kind: EventKind::Killed {
                path: KillPath::Escalated,
                cpu_percent: 97.46,
            },
        };
        assert!(ev.to_string().contains("97.5%"));
    }

    #[test]
    fn power_state_display() {
        assert_eq!(PowerState::AcPower.to_string(), "AC Power");
        assert_eq!(
            PowerState::Battery { capacity: Some(41) }.to_string(),
            "Battery (41%)"
        );
        assert_eq!(PowerState::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn monitor_error_display() {
        let err = MonitorError::NoSuchProcess { pid: 9 };
        assert!(err.to_string().contains("no such process"));
        let err = MonitorError::Config("bad json".to_string());
        assert!(err.to_string().contains("bad json"));
    }
}
