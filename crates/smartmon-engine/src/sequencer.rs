//! [`TerminationSequencer`] – warning pulse, then terminate-or-kill.
//!
//! Every target goes through the same states:
//!
//! ```text
//! Idle → WarningPulse (PULSE_STEPS × PULSE_CYCLES frames) → Terminating
//!      → Killed(Graceful | Escalated) | Failed → Idle
//! ```
//!
//! The cancellation token is checked before and after every pulse frame; a
//! cancelled sequence sends no signal.  Terminating sends SIGTERM, waits up to the
//! configured signal timeout and escalates to SIGKILL only if the process is
//! still alive.  Every terminal outcome except `Cancelled` lands in the
//! [`EventLog`].
//!
//! Targets in a batch are handled strictly one after another.  The display
//! snapshot passed in is never re-collected, only filtered to drop pids that
//! have already been handled.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Local;
use smartmon_types::{EnforcementEvent, EventKind, KillPath, MonitorError, ProcessRecord};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::event_log::EventLog;
use crate::host::ProcessHost;

/// Colour steps in one pulse cycle.
pub const PULSE_STEPS: u8 = 8;
/// Full pulse cycles before the terminate request.
pub const PULSE_CYCLES: u8 = 2;
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(250);

/// Which row is pulsing and at which colour step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseMarker {
    pub pid: u32,
    /// `0..PULSE_STEPS`
    pub step: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    Killed(KillPath),
    Failed { reason: String },
    Cancelled,
}

pub struct TerminationSequencer {
    frame_duration: Duration,
    signal_timeout: Duration,
    log: EventLog,
}

impl TerminationSequencer {
    pub fn new(frame_duration: Duration, signal_timeout: Duration) -> Self {
        Self {
            frame_duration,
            signal_timeout,
            log: EventLog::default(),
        }
    }

    pub fn set_signal_timeout(&mut self, timeout: Duration) {
        self.signal_timeout = timeout;
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Run the full sequence against each of `targets` in order.
    ///
    /// `on_frame` is called after every pulse frame with the current display
    /// rows, the pulse marker and the event log.  Returns the pids that
    /// reached a terminal outcome; stops early when `cancel` fires.
    pub fn run_batch<F>(
        &mut self,
        targets: &[ProcessRecord],
        display: &[ProcessRecord],
        host: &mut dyn ProcessHost,
        cancel: &CancelToken,
        mut on_frame: F,
    ) -> HashSet<u32>
    where
        F: FnMut(&[ProcessRecord], PulseMarker, &EventLog),
    {
        let mut handled = HashSet::new();
        let mut rows: Vec<ProcessRecord> = display.to_vec();

        for target in targets {
            if handled.contains(&target.pid) {
                continue;
            }
            let outcome = self.execute(target, &rows, host, cancel, &mut on_frame);
            if outcome == SequenceOutcome::Cancelled {
                break;
            }
            handled.insert(target.pid);
            rows.retain(|r| r.pid != target.pid);
        }
        handled
    }

    /// Pulse, then terminate a single target.
    pub fn execute<F>(
        &mut self,
        target: &ProcessRecord,
        display: &[ProcessRecord],
        host: &mut dyn ProcessHost,
        cancel: &CancelToken,
        on_frame: &mut F,
    ) -> SequenceOutcome
    where
        F: FnMut(&[ProcessRecord], PulseMarker, &EventLog),
    {
        let frames = u16::from(PULSE_STEPS) * u16::from(PULSE_CYCLES);
        for frame in 0..frames {
            if cancel.is_cancelled() {
                return cancelled(target.pid);
            }
            let marker = PulseMarker {
                pid: target.pid,
                step: (frame % u16::from(PULSE_STEPS)) as u8,
            };
            on_frame(display, marker, &self.log);
            // Covers an interrupt during the render or hold of the last frame.
            if cancel.sleep(self.frame_duration) {
                return cancelled(target.pid);
            }
        }

        let outcome = self.terminate(target.pid, host);
        self.record(target, &outcome);
        outcome
    }

    fn terminate(&self, pid: u32, host: &mut dyn ProcessHost) -> SequenceOutcome {
        let failed = |e: MonitorError| SequenceOutcome::Failed {
            reason: e.to_string(),
        };
        if let Err(e) = host.terminate(pid) {
            return failed(e);
        }
        match host.wait_for_exit(pid, self.signal_timeout) {
            Ok(true) => SequenceOutcome::Killed(KillPath::Graceful),
            Ok(false) => match host.force_kill(pid) {
                Ok(()) => SequenceOutcome::Killed(KillPath::Escalated),
                Err(e) => failed(e),
            },
            Err(e) => failed(e),
        }
    }

    fn record(&mut self, target: &ProcessRecord, outcome: &SequenceOutcome) {
        let kind = match outcome {
            SequenceOutcome::Killed(path) => {
                info!(pid = target.pid, name = %target.name, ?path, "process terminated");
                EventKind::Killed {
                    path: *path,
                    cpu_percent: target.cpu_percent,
                }
            }
            SequenceOutcome::Failed { reason } => {
                warn!(pid = target.pid, name = %target.name, %reason, "termination failed");
                EventKind::Failed {
                    reason: reason.clone(),
                }
            }
            SequenceOutcome::Cancelled => return,
        };
        self.log.push(EnforcementEvent {
            at: Local::now(),
            pid: target.pid,
            name: target.name.clone(),
            kind,
        });
    }
}

fn cancelled(pid: u32) -> SequenceOutcome {
    info!(pid, "enforcement cancelled during warning pulse");
    SequenceOutcome::Cancelled
}
