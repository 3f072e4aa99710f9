//! System snapshot assembly and the AC / battery probe.
//!
//! Power state is informational only; nothing in the classification or
//! enforcement path reads it.

use std::fs;
use std::path::{Path, PathBuf};

use smartmon_types::{PowerState, SystemSnapshot, TelemetryCounters};
use tracing::trace;

use crate::host::SystemMetrics;

pub const DEFAULT_POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Reads `/sys/class/power_supply/*`.
#[derive(Debug, Clone)]
pub struct PowerProbe {
    root: PathBuf,
}

impl Default for PowerProbe {
    fn default() -> Self {
        Self::new(DEFAULT_POWER_SUPPLY_ROOT)
    }
}

impl PowerProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The first supply reporting `online` decides between AC and battery;
    /// otherwise the first `Battery`-typed supply is reported with its
    /// capacity.
    pub fn probe(&self) -> PowerState {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return PowerState::Unknown;
        };
        let mut supplies: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        supplies.sort();

        for supply in supplies {
            if let Some(online) = read_trimmed(&supply.join("online")) {
                return if online == "1" {
                    PowerState::AcPower
                } else {
                    PowerState::Battery { capacity: None }
                };
            }
            if read_trimmed(&supply.join("type")).as_deref() == Some("Battery") {
                let capacity = read_trimmed(&supply.join("capacity")).and_then(|c| c.parse().ok());
                return PowerState::Battery { capacity };
            }
        }
        PowerState::Unknown
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) => {
            trace!(path = %path.display(), error = %e, "power supply attribute unreadable");
            None
        }
    }
}

/// Combine host metrics, power state and telemetry counters.
pub fn snapshot(
    metrics: &SystemMetrics,
    power_state: PowerState,
    telemetry_available: bool,
    counters: TelemetryCounters,
) -> SystemSnapshot {
    let total = metrics.memory_total_bytes as f64;
    let used = metrics.memory_used_bytes as f64;
    let memory_percent = if total > 0.0 { used / total * 100.0 } else { 0.0 };
    SystemSnapshot {
        cpu_count: metrics.cpu_count.max(1),
        cpu_percent: metrics.cpu_percent,
        memory_total_gb: total / BYTES_PER_GB,
        memory_used_gb: used / BYTES_PER_GB,
        memory_percent,
        load: metrics.load,
        power_state,
        telemetry_available,
        tracked_processes: counters.tracked,
        total_predictions: counters.predictions,
    }
}
