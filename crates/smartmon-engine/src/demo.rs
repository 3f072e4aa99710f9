//! Synthetic process world for running without the kernel module.
//!
//! [`DemoWorld`] holds twelve fake processes.  [`DemoHost`] exposes them as a
//! [`ProcessHost`] and [`DemoTelemetry`] publishes matching predictions and
//! statistics, so the fusion engine, the selector and the sequencer run
//! unchanged.  Severity still comes from the normal classification rules.
//!
//! A terminated demo process disappears immediately and is respawned under a
//! new pid on the next refresh, so the enforcement path keeps firing.
//!
//! # Example
//!
//! ```
//! use smartmon_engine::demo::DemoWorld;
//! use smartmon_engine::host::ProcessHost;
//!
//! let (mut host, _telemetry) = DemoWorld::new().split();
//! host.refresh();
//! assert_eq!(host.processes().len(), 12);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smartmon_policy::{BlocklistEntry, BlocklistPolicy};
use smartmon_telemetry::TelemetrySource;
use smartmon_types::{
    FLAG_ACTIVE, FLAG_CPU_SPIKE_PREDICTED, FLAG_IO_SPIKE_PREDICTED, FLAG_MEM_SPIKE_PREDICTED,
    LoadAverage, MonitorError, Prediction, SpikeFlags, TelemetryCounters, TelemetryStats,
};
use tracing::debug;

use crate::host::{LiveSample, ProcessHost, ProcessIdentity, SystemMetrics};

/// `(name, base cpu %, base memory MiB, hostile)`
const BASE_PROCESSES: [(&str, f64, f64, bool); 12] = [
    ("firefox", 8.5, 1200.0, false),
    ("code", 12.3, 890.0, false),
    ("gnome-shell", 3.1, 450.0, false),
    ("python3", 5.7, 220.0, false),
    ("node", 4.2, 310.0, false),
    ("chrome", 15.8, 1800.0, false),
    ("Xorg", 2.0, 180.0, false),
    ("pulseaudio", 0.5, 45.0, false),
    ("cryptominer", 92.0, 50.0, true),
    ("tmux", 0.1, 12.0, false),
    ("nvim", 1.2, 65.0, false),
    ("stress-ng", 97.5, 30.0, true),
];

/// Blocklist threshold for the hostile demo processes.
pub const DEMO_THRESHOLD: f64 = 50.0;
/// Prediction counter reported by the demo status.
const DEMO_PREDICTIONS: u64 = 47;

/// Add the blocklist entries the demo relies on, unless already present.
pub fn install_demo_blocklist(policy: &mut BlocklistPolicy) {
    for (name, _, _, hostile) in BASE_PROCESSES {
        if hostile {
            policy.ensure_entry(BlocklistEntry::new(name, Some(DEMO_THRESHOLD)));
        }
    }
}

#[derive(Debug, Clone)]
struct DemoProcess {
    pid: u32,
    name: &'static str,
    base_cpu: f64,
    base_mem: f64,
    hostile: bool,
    alive: bool,
    cpu: f64,
    mem: f64,
    stats: TelemetryStats,
    spikes: SpikeFlags,
}

/// The shared state behind [`DemoHost`] and [`DemoTelemetry`].
pub struct DemoWorld {
    procs: Vec<DemoProcess>,
    tick: u64,
    next_pid: u32,
    rng: StdRng,
}

impl Default for DemoWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoWorld {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic world for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let procs: Vec<DemoProcess> = BASE_PROCESSES
            .iter()
            .enumerate()
            .map(|(i, &(name, base_cpu, base_mem, hostile))| DemoProcess {
                pid: 1000 + i as u32 * 111,
                name,
                base_cpu,
                base_mem,
                hostile,
                alive: true,
                cpu: 0.0,
                mem: base_mem,
                stats: TelemetryStats::default(),
                spikes: SpikeFlags::default(),
            })
            .collect();
        let next_pid = procs.iter().map(|p| p.pid).max().unwrap_or(1000) + 1;
        Self {
            procs,
            tick: 0,
            next_pid,
            rng,
        }
    }

    /// Wrap the world in a shared handle and hand out both views of it.
    pub fn split(self) -> (DemoHost, DemoTelemetry) {
        let world = Rc::new(RefCell::new(self));
        (
            DemoHost {
                world: Rc::clone(&world),
            },
            DemoTelemetry { world },
        )
    }

    /// Advance one tick: respawn terminated processes and draw new values.
    fn advance(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        for p in &mut self.procs {
            if !p.alive {
                p.pid = self.next_pid;
                self.next_pid += 1;
                p.alive = true;
                debug!(pid = p.pid, name = p.name, "demo process respawned");
            }

            let jitter: f64 = self.rng.gen_range(-2.0..=2.0);
            let surge = if p.hostile { 5.0 * (tick % 3) as f64 } else { 0.0 };
            p.cpu = (p.base_cpu + jitter + surge).max(0.0);
            p.mem = (p.base_mem + self.rng.gen_range(-50.0..=50.0)).max(1.0);

            let cpu_roc = if p.hostile {
                (p.cpu * 100.0) as i64
            } else {
                self.rng.gen_range(-200..=500)
            };
            p.stats = TelemetryStats {
                cpu_ema: (p.cpu * 100.0) as i64,
                mem_ema: p.mem as i64,
                io_ema: 0,
                cpu_roc,
                mem_roc: self.rng.gen_range(-100..=300),
                io_roc: self.rng.gen_range(-50..=200),
                samples: tick,
            };
            p.spikes = SpikeFlags {
                cpu: p.hostile,
                mem: self.rng.gen_bool(0.1),
                io: self.rng.gen_bool(0.05),
            };
        }
    }

    fn alive(&self) -> impl Iterator<Item = &DemoProcess> {
        self.procs.iter().filter(|p| p.alive)
    }

    fn find(&self, pid: u32) -> Option<&DemoProcess> {
        self.alive().find(|p| p.pid == pid)
    }

    fn kill(&mut self, pid: u32) -> Result<(), MonitorError> {
        let p = self
            .procs
            .iter_mut()
            .find(|p| p.alive && p.pid == pid)
            .ok_or(MonitorError::NoSuchProcess { pid })?;
        p.alive = false;
        Ok(())
    }
}

fn flags_for(spikes: SpikeFlags) -> u32 {
    let mut flags = FLAG_ACTIVE;
    if spikes.cpu {
        flags |= FLAG_CPU_SPIKE_PREDICTED;
    }
    if spikes.mem {
        flags |= FLAG_MEM_SPIKE_PREDICTED;
    }
    if spikes.io {
        flags |= FLAG_IO_SPIKE_PREDICTED;
    }
    flags
}

// ────────────────────────────────────────────────────────────────────────────
// DemoHost
// ────────────────────────────────────────────────────────────────────────────

/// [`ProcessHost`] view of a [`DemoWorld`].  Signals always succeed and take
/// effect immediately.
pub struct DemoHost {
    world: Rc<RefCell<DemoWorld>>,
}

impl ProcessHost for DemoHost {
    fn refresh(&mut self) {
        self.world.borrow_mut().advance();
    }

    fn processes(&self) -> Vec<ProcessIdentity> {
        let world = self.world.borrow();
        let mut out: Vec<ProcessIdentity> = world
            .alive()
            .map(|p| ProcessIdentity {
                pid: p.pid,
                name: p.name.to_string(),
                owner: Some(1000),
            })
            .collect();
        out.sort_by_key(|p| p.pid);
        out
    }

    fn sample(&self, pid: u32) -> Result<LiveSample, MonitorError> {
        let world = self.world.borrow();
        let p = world.find(pid).ok_or(MonitorError::NoSuchProcess { pid })?;
        Ok(LiveSample {
            cpu_percent: p.cpu,
            memory_mb: p.mem,
        })
    }

    fn terminate(&mut self, pid: u32) -> Result<(), MonitorError> {
        self.world.borrow_mut().kill(pid)
    }

    fn force_kill(&mut self, pid: u32) -> Result<(), MonitorError> {
        self.world.borrow_mut().kill(pid)
    }

    fn wait_for_exit(&mut self, pid: u32, _timeout: Duration) -> Result<bool, MonitorError> {
        Ok(self.world.borrow().find(pid).is_none())
    }

    fn system_metrics(&self) -> SystemMetrics {
        let world = self.world.borrow();
        let cpu: f64 = world.alive().map(|p| p.cpu).sum();
        let mem_mb: f64 = world.alive().map(|p| p.mem).sum();
        let cpu_count = 8;
        SystemMetrics {
            cpu_count,
            cpu_percent: (cpu / cpu_count as f64).min(100.0),
            memory_total_bytes: 16 * 1024 * 1024 * 1024,
            memory_used_bytes: (mem_mb * 1024.0 * 1024.0) as u64,
            load: LoadAverage {
                one: cpu / 100.0,
                five: cpu / 110.0,
                fifteen: cpu / 120.0,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DemoTelemetry
// ────────────────────────────────────────────────────────────────────────────

/// [`TelemetrySource`] view of a [`DemoWorld`].  Always available.
pub struct DemoTelemetry {
    world: Rc<RefCell<DemoWorld>>,
}

impl TelemetrySource for DemoTelemetry {
    fn available(&self) -> bool {
        true
    }

    fn read_counters(&self) -> TelemetryCounters {
        TelemetryCounters {
            tracked: self.world.borrow().alive().count() as u64,
            predictions: DEMO_PREDICTIONS,
        }
    }

    fn read_predictions(&self) -> HashMap<u32, Prediction> {
        self.world
            .borrow()
            .alive()
            .map(|p| {
                (
                    p.pid,
                    Prediction {
                        name: p.name.to_string(),
                        spikes: p.spikes,
                        flags: flags_for(p.spikes),
                    },
                )
            })
            .collect()
    }

    fn read_stats(&self) -> HashMap<u32, TelemetryStats> {
        self.world
            .borrow()
            .alive()
            .map(|p| (p.pid, p.stats))
            .collect()
    }
}
