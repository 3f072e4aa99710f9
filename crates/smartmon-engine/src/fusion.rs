//! Process Fusion Engine.
//!
//! Joins the live process table with the scheduler's predictive telemetry and
//! derives one [`ProcessRecord`] per pid per poll.
//!
//! Each poll:
//! 1. refreshes the [`ProcessHost`] and samples every enumerated pid.  A pid
//!    seen for the first time gets a priming sample whose CPU value is
//!    discarded (it reports 0.0 for that poll).  A pid that cannot be sampled
//!    is evicted and skipped.
//! 2. reads one [`TelemetryFrame`]; missing telemetry means no spikes and
//!    zero statistics.
//! 3. applies the blocklist/safe-list, the severity rules and the
//!    consecutive-spike counter.
//!
//! Tracking state for pids not seen in a poll is dropped at the end of that
//! poll.
//!
//! # Severity rules
//!
//! First match wins:
//!
//! | Severity | Condition |
//! |---|---|
//! | `CRITICAL` | blocklisted and at or above its CPU threshold |
//! | `HIGH` | largest \|ROC\| > 3000 |
//! | `MEDIUM` | largest \|ROC\| > 1500 |
//! | `LOW` | largest \|ROC\| > 500 |
//! | `WARNING` | any spike predicted |
//! | `NORMAL` | otherwise |

use std::collections::{HashMap, HashSet};
use std::path::Path;

use smartmon_policy::BlocklistPolicy;
use smartmon_telemetry::TelemetrySource;
use smartmon_types::{ProcessRecord, Severity, TelemetryCounters, TelemetryFrame, Trend};
use tracing::{debug, trace};

use crate::host::ProcessHost;

pub const ROC_HIGH: u64 = 3000;
pub const ROC_MEDIUM: u64 = 1500;
pub const ROC_LOW: u64 = 500;

/// Classify a record whose live metrics, telemetry and blocklist membership
/// are already filled in.  Pure; calling it twice gives the same answer.
pub fn classify(record: &ProcessRecord, policy: &BlocklistPolicy) -> Severity {
    if record.blocklisted && policy.check_threshold(&record.name, record.cpu_percent) {
        return Severity::Critical;
    }
    match record.stats.max_roc_magnitude() {
        roc if roc > ROC_HIGH => Severity::High,
        roc if roc > ROC_MEDIUM => Severity::Medium,
        roc if roc > ROC_LOW => Severity::Low,
        _ if record.spikes.any() => Severity::Warning,
        _ => Severity::Normal,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SpikeHistory
// ────────────────────────────────────────────────────────────────────────────

/// Consecutive non-`NORMAL` poll count per pid.
#[derive(Debug, Default)]
pub struct SpikeHistory {
    counts: HashMap<u32, u32>,
}

impl SpikeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one poll's severity into the counter and return the new count.
    pub fn record(&mut self, pid: u32, severity: Severity) -> u32 {
        let count = self.counts.entry(pid).or_insert(0);
        *count = if severity.is_normal() {
            0
        } else {
            count.saturating_add(1)
        };
        *count
    }

    pub fn get(&self, pid: u32) -> u32 {
        self.counts.get(&pid).copied().unwrap_or(0)
    }

    pub fn forget(&mut self, pid: u32) {
        self.counts.remove(&pid);
    }

    /// Drop every pid not in `observed`.
    pub fn retain_observed(&mut self, observed: &HashSet<u32>) {
        self.counts.retain(|pid, _| observed.contains(pid));
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ProcessFusionEngine
// ────────────────────────────────────────────────────────────────────────────

/// Per-pid state kept between polls.
#[derive(Debug)]
struct TrackedProcess {
    polls: u64,
}

pub struct ProcessFusionEngine {
    policy: BlocklistPolicy,
    telemetry: Box<dyn TelemetrySource>,
    tracked: HashMap<u32, TrackedProcess>,
    history: SpikeHistory,
}

impl ProcessFusionEngine {
    pub fn new(policy: BlocklistPolicy, telemetry: Box<dyn TelemetrySource>) -> Self {
        Self {
            policy,
            telemetry,
            tracked: HashMap::new(),
            history: SpikeHistory::new(),
        }
    }

    /// Produce this cycle's records, ascending by pid.
    pub fn poll(&mut self, host: &mut dyn ProcessHost) -> Vec<ProcessRecord> {
        host.refresh();
        let frame = self.telemetry.read_frame();
        let identities = host.processes();

        let mut observed = HashSet::with_capacity(identities.len());
        let mut records = Vec::with_capacity(identities.len());

        for ident in identities {
            let pid = ident.pid;
            let sample = match host.sample(pid) {
                Ok(sample) => sample,
                Err(e) => {
                    debug!(pid, error = %e, "process not sampleable, evicting");
                    self.evict(pid);
                    continue;
                }
            };

            let cpu_percent = match self.tracked.get_mut(&pid) {
                Some(tracked) => {
                    tracked.polls += 1;
                    sample.cpu_percent
                }
                None => {
                    trace!(pid, name = %ident.name, "priming new process");
                    self.tracked.insert(pid, TrackedProcess { polls: 1 });
                    0.0
                }
            };
            observed.insert(pid);

            let record = self.fuse(
                ProcessRecord::new(pid, ident.name, cpu_percent, sample.memory_mb),
                &frame,
            );
            records.push(record);
        }

        self.tracked.retain(|pid, _| observed.contains(pid));
        self.history.retain_observed(&observed);
        records.sort_by_key(|r| r.pid);
        records
    }

    fn fuse(&mut self, mut record: ProcessRecord, frame: &TelemetryFrame) -> ProcessRecord {
        if let Some(pred) = frame.predictions.get(&record.pid) {
            record.spikes = pred.spikes;
            record.flags = pred.flags;
        }
        if let Some(stats) = frame.stats.get(&record.pid) {
            record.stats = *stats;
        }
        record.safe = self.policy.is_safe(&record.name);
        record.blocklisted = self.policy.is_monitored(&record.name);
        record.severity = classify(&record, &self.policy);
        record.consecutive_spikes = self.history.record(record.pid, record.severity);
        record.trend = Trend::from_roc(record.stats.cpu_roc);
        record
    }

    fn evict(&mut self, pid: u32) {
        self.tracked.remove(&pid);
        self.history.forget(pid);
    }

    pub fn telemetry_available(&self) -> bool {
        self.telemetry.available()
    }

    pub fn telemetry_counters(&self) -> TelemetryCounters {
        if self.telemetry.available() {
            self.telemetry.read_counters()
        } else {
            TelemetryCounters::default()
        }
    }

    pub fn policy(&self) -> &BlocklistPolicy {
        &self.policy
    }

    /// See [`BlocklistPolicy::reload`].
    pub fn reload_policy(&mut self, path: &Path) -> bool {
        self.policy.reload(path)
    }

    /// Number of pids with live tracking state.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// How many polls `pid` has been tracked for (0 if untracked).
    pub fn polls_for(&self, pid: u32) -> u64 {
        self.tracked.get(&pid).map_or(0, |t| t.polls)
    }

    pub fn spike_history(&self) -> &SpikeHistory {
        &self.history
    }
}
