//! In-process fakes shared by the engine's unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use smartmon_telemetry::TelemetrySource;
use smartmon_types::{
    LoadAverage, MonitorError, Prediction, SpikeFlags, TelemetryCounters, TelemetryFrame,
    TelemetryStats,
};

use crate::host::{LiveSample, ProcessHost, ProcessIdentity, SystemMetrics};

#[derive(Debug, Clone)]
pub struct FakeProc {
    pub name: String,
    pub cpu: f64,
    pub mem: f64,
}

/// Scriptable [`ProcessHost`] that records every signal it is asked to send.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub procs: BTreeMap<u32, FakeProc>,
    /// Pids whose sampling fails with access denied.
    pub unreadable: HashSet<u32>,
    /// Pids that ignore SIGTERM.
    pub stubborn: HashSet<u32>,
    /// Pids whose signals fail with access denied.
    pub protected: HashSet<u32>,
    pub signals: Vec<(u32, &'static str)>,
    pub refreshes: usize,
}

impl FakeHost {
    pub fn with(procs: &[(u32, &str, f64)]) -> Self {
        let mut host = Self::default();
        for &(pid, name, cpu) in procs {
            host.add(pid, name, cpu);
        }
        host
    }

    pub fn add(&mut self, pid: u32, name: &str, cpu: f64) {
        self.procs.insert(
            pid,
            FakeProc {
                name: name.to_string(),
                cpu,
                mem: 64.0,
            },
        );
    }

    fn check_signal(&self, pid: u32) -> Result<(), MonitorError> {
        if self.protected.contains(&pid) {
            return Err(MonitorError::AccessDenied { pid });
        }
        if !self.procs.contains_key(&pid) {
            return Err(MonitorError::NoSuchProcess { pid });
        }
        Ok(())
    }
}

impl ProcessHost for FakeHost {
    fn refresh(&mut self) {
        self.refreshes += 1;
    }

    fn processes(&self) -> Vec<ProcessIdentity> {
        self.procs
            .iter()
            .map(|(&pid, p)| ProcessIdentity {
                pid,
                name: p.name.clone(),
                owner: Some(1000),
            })
            .collect()
    }

    fn sample(&self, pid: u32) -> Result<LiveSample, MonitorError> {
        if self.unreadable.contains(&pid) {
            return Err(MonitorError::AccessDenied { pid });
        }
        let p = self
            .procs
            .get(&pid)
            .ok_or(MonitorError::NoSuchProcess { pid })?;
        Ok(LiveSample {
            cpu_percent: p.cpu,
            memory_mb: p.mem,
        })
    }

    fn terminate(&mut self, pid: u32) -> Result<(), MonitorError> {
        self.check_signal(pid)?;
        self.signals.push((pid, "TERM"));
        if !self.stubborn.contains(&pid) {
            self.procs.remove(&pid);
        }
        Ok(())
    }

    fn force_kill(&mut self, pid: u32) -> Result<(), MonitorError> {
        self.check_signal(pid)?;
        self.signals.push((pid, "KILL"));
        self.procs.remove(&pid);
        Ok(())
    }

    fn wait_for_exit(&mut self, pid: u32, _timeout: Duration) -> Result<bool, MonitorError> {
        Ok(!self.procs.contains_key(&pid))
    }

    fn system_metrics(&self) -> SystemMetrics {
        SystemMetrics {
            cpu_count: 4,
            cpu_percent: 12.5,
            memory_total_bytes: 8 * 1024 * 1024 * 1024,
            memory_used_bytes: 2 * 1024 * 1024 * 1024,
            load: LoadAverage {
                one: 0.5,
                five: 0.4,
                fifteen: 0.3,
            },
        }
    }
}

/// Telemetry whose frame can be changed between polls.
#[derive(Debug, Clone, Default)]
pub struct SharedTelemetry {
    pub frame: Rc<RefCell<TelemetryFrame>>,
    pub offline: bool,
}

impl SharedTelemetry {
    pub fn set_spikes(&self, pid: u32, spikes: SpikeFlags) {
        self.frame.borrow_mut().predictions.insert(
            pid,
            Prediction {
                name: String::new(),
                spikes,
                flags: 0,
            },
        );
    }

    pub fn set_stats(&self, pid: u32, stats: TelemetryStats) {
        self.frame.borrow_mut().stats.insert(pid, stats);
    }

    pub fn clear(&self) {
        *self.frame.borrow_mut() = TelemetryFrame::empty();
    }
}

impl TelemetrySource for SharedTelemetry {
    fn available(&self) -> bool {
        !self.offline
    }

    fn read_counters(&self) -> TelemetryCounters {
        let frame = self.frame.borrow();
        TelemetryCounters {
            tracked: frame.stats.len() as u64,
            predictions: frame.predictions.len() as u64,
        }
    }

    fn read_predictions(&self) -> HashMap<u32, Prediction> {
        self.frame.borrow().predictions.clone()
    }

    fn read_stats(&self) -> HashMap<u32, TelemetryStats> {
        self.frame.borrow().stats.clone()
    }
}
