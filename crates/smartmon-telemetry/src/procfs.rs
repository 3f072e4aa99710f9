//! [`ProcfsTelemetry`] – reader for `/proc/smartscheduler/*`.
//!
//! The kernel module exports three line-oriented text files:
//!
//! | File | Content |
//! |---|---|
//! | `status` | `Tracked processes: <n>` and `Total predictions: <n>` lines |
//! | `predictions` | 4 header lines, then `<pid> <comm...> <cpu> <mem> <io> <flags>` |
//! | `stats` | 4 header lines, then `<pid> <cpu_ema> <mem_ema> <io_ema> <cpu_roc> <mem_roc> <io_roc> [samples]` |
//!
//! Prediction markers are `*` (spike predicted) or `-`.  The command name may
//! contain spaces and spans every field between the pid and the last four
//! columns.  Rows that do not match the expected shape (legends, truncation
//! notices, garbled numbers) are skipped one by one.
//!
//! # Example
//!
//! ```
//! use smartmon_telemetry::parse_predictions;
//!
//! let text = "=== Current Predictions ===\n\n\
//!             PID      COMM     CPU    MEM    I/O    FLAGS\n\
//!             ---      ----     ---    ---    ---    -----\n\
//!             4242     Web Content  *  -  -  0x81\n";
//! let preds = parse_predictions(text);
//! assert_eq!(preds[&4242].name, "Web Content");
//! assert!(preds[&4242].spikes.cpu);
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use smartmon_types::{Prediction, SpikeFlags, TelemetryCounters, TelemetryStats};
use tracing::{debug, trace};

use crate::source::TelemetrySource;

/// Default location of the scheduler's proc directory.
pub const DEFAULT_ROOT: &str = "/proc/smartscheduler";

/// Header lines preceding the rows of the prediction and stats tables.
const HEADER_LINES: usize = 4;

/// Reads predictive telemetry from the scheduler's proc files.
#[derive(Debug, Clone)]
pub struct ProcfsTelemetry {
    root: PathBuf,
}

impl Default for ProcfsTelemetry {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl ProcfsTelemetry {
    /// Read the `status`, `predictions` and `stats` files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, file: &str) -> Option<String> {
        let path = self.root.join(file);
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "telemetry file unreadable");
                None
            }
        }
    }
}

impl TelemetrySource for ProcfsTelemetry {
    fn available(&self) -> bool {
        self.root.join("status").exists()
    }

    fn read_counters(&self) -> TelemetryCounters {
        self.read("status")
            .map(|text| parse_status(&text))
            .unwrap_or_default()
    }

    fn read_predictions(&self) -> HashMap<u32, Prediction> {
        self.read("predictions")
            .map(|text| parse_predictions(&text))
            .unwrap_or_default()
    }

    fn read_stats(&self) -> HashMap<u32, TelemetryStats> {
        self.read("stats")
            .map(|text| parse_stats(&text))
            .unwrap_or_default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Parsers
// ────────────────────────────────────────────────────────────────────────────

/// Extract the tracked-process and prediction counters from the status file.
pub fn parse_status(text: &str) -> TelemetryCounters {
    let mut counters = TelemetryCounters::default();
    for line in text.lines() {
        let slot = if line.contains("Tracked processes:") {
            &mut counters.tracked
        } else if line.contains("Total predictions:") {
            &mut counters.predictions
        } else {
            continue;
        };
        match line.rsplit(':').next().map(str::trim).map(str::parse::<u64>) {
            Some(Ok(value)) => *slot = value,
            _ => trace!(line, "skipping malformed status line"),
        }
    }
    counters
}

/// Parse the prediction table into a pid-keyed map.
pub fn parse_predictions(text: &str) -> HashMap<u32, Prediction> {
    text.lines()
        .skip(HEADER_LINES)
        .filter_map(|line| {
            let row = parse_prediction_row(line);
            if row.is_none() {
                trace!(line, "skipping malformed prediction row");
            }
            row
        })
        .collect()
}

/// Parse the statistics table into a pid-keyed map.
pub fn parse_stats(text: &str) -> HashMap<u32, TelemetryStats> {
    text.lines()
        .skip(HEADER_LINES)
        .filter_map(|line| {
            let row = parse_stats_row(line);
            if row.is_none() {
                trace!(line, "skipping malformed stats row");
            }
            row
        })
        .collect()
}

fn parse_prediction_row(line: &str) -> Option<(u32, Prediction)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let n = parts.len();
    if n < 6 {
        return None;
    }
    let pid = parts[0].parse::<u32>().ok()?;
    let spikes = SpikeFlags {
        cpu: parse_marker(parts[n - 4])?,
        mem: parse_marker(parts[n - 3])?,
        io: parse_marker(parts[n - 2])?,
    };
    let flags = parse_hex(parts[n - 1])?;
    let name = parts[1..n - 4].join(" ");
    Some((pid, Prediction { name, spikes, flags }))
}

fn parse_stats_row(line: &str) -> Option<(u32, TelemetryStats)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if !(7..=8).contains(&parts.len()) {
        return None;
    }
    let pid = parts[0].parse::<u32>().ok()?;
    let int = |i: usize| parts[i].parse::<i64>().ok();
    let samples = match parts.get(7) {
        Some(raw) => raw.parse::<u64>().ok()?,
        None => 0,
    };
    Some((
        pid,
        TelemetryStats {
            cpu_ema: int(1)?,
            mem_ema: int(2)?,
            io_ema: int(3)?,
            cpu_roc: int(4)?,
            mem_roc: int(5)?,
            io_roc: int(6)?,
            samples,
        },
    ))
}

fn parse_marker(field: &str) -> Option<bool> {
    match field {
        "*" => Some(true),
        "-" => Some(false),
        _ => None,
    }
}

fn parse_hex(field: &str) -> Option<u32> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u32::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "=== SmartScheduler Status ===\n\
        Module uptime:        120 seconds\n\
        Tracked processes:    37\n\
        Total predictions:    912\n\
        Sample interval:      100 ms\n";

    const PREDICTIONS: &str = "=== Current Predictions ===\n\
        \n\
        PID      COMM                CPU    MEM    I/O    FLAGS\n\
        ---      ----                ---    ---    ---    -----\n\
        101      stress-ng             *      -      -     0x81\n\
        202      Web Content           -      *      *     0x86\n\
        303      kworker/0:1           -      -      -        0\n\
        \n\
        Legend: * = spike predicted, - = normal\n";

    const STATS: &str = "=== Process Statistics ===\n\
        \n\
        PID       CPU_EMA  MEM_EMA   IO_EMA  CPU_ROC  MEM_ROC   IO_ROC    SAMPLES\n\
        ---       -------  -------   ------  -------  -------   ------    -------\n\
        101          4500      120       10    +3200      -40       +0        812\n\
        202           300     9000      700     -150    +1600     +900         77\n";

    #[test]
    fn status_counters_are_parsed() {
        let c = parse_status(STATUS);
        assert_eq!(c.tracked, 37);
        assert_eq!(c.predictions, 912);
    }

    #[test]
    fn malformed_status_value_is_ignored() {
        let c = parse_status("Tracked processes: many\nTotal predictions: 4\n");
        assert_eq!(c.tracked, 0);
        assert_eq!(c.predictions, 4);
    }

    #[test]
    fn predictions_parse_markers_and_flags() {
        let preds = parse_predictions(PREDICTIONS);
        assert_eq!(preds.len(), 3);

        let stress = &preds[&101];
        assert_eq!(stress.name, "stress-ng");
        assert!(stress.spikes.cpu && !stress.spikes.mem && !stress.spikes.io);
        assert_eq!(stress.flags, 0x81);

        let web = &preds[&202];
        assert_eq!(web.name, "Web Content");
        assert!(!web.spikes.cpu && web.spikes.mem && web.spikes.io);

        assert_eq!(preds[&303].flags, 0);
        assert!(!preds[&303].spikes.any());
    }

    #[test]
    fn malformed_prediction_rows_are_skipped_individually() {
        let text = "h1\nh2\nh3\nh4\n\
            abc   name  *  -  -  0x1\n\
            11    good  *  -  -  0x1\n\
            12    bad   ?  -  -  0x1\n\
            13    hex   -  -  -  zz\n\
            14    -  -  *  0x4\n\
            15    also good  -  -  *  4\n";
        let preds = parse_predictions(text);
        let mut pids: Vec<_> = preds.keys().copied().collect();
        pids.sort();
        assert_eq!(pids, vec![11, 15]);
        assert_eq!(preds[&15].name, "also good");
        assert_eq!(preds[&15].flags, 4);
    }

    #[test]
    fn header_lines_are_never_rows() {
        // A numeric-looking row inside the header block must be ignored.
        let text = "1 fake * * * 0x7\n\n\n\n2 real - - - 0x0\n";
        let preds = parse_predictions(text);
        assert!(!preds.contains_key(&1));
        assert!(preds.contains_key(&2));
    }

    #[test]
    fn stats_parse_signed_values_and_samples() {
        let stats = parse_stats(STATS);
        assert_eq!(stats.len(), 2);
        let s = stats[&101];
        assert_eq!(s.cpu_ema, 4500);
        assert_eq!(s.cpu_roc, 3200);
        assert_eq!(s.mem_roc, -40);
        assert_eq!(s.samples, 812);
        assert_eq!(stats[&202].cpu_roc, -150);
    }

    #[test]
    fn stats_row_without_samples_column_is_accepted() {
        let text = "a\nb\nc\nd\n7 1 2 3 4 5 6\n";
        let stats = parse_stats(text);
        assert_eq!(stats[&7].io_roc, 6);
        assert_eq!(stats[&7].samples, 0);
    }

    #[test]
    fn bad_stats_row_does_not_abort_the_read() {
        let text = "a\nb\nc\nd\n\
            1 10 20 30 x 50 60 1\n\
            2 10 20 30 40 50 60 1\n\
            3 10 20\n";
        let stats = parse_stats(text);
        assert_eq!(stats.len(), 1);
        assert!(stats.contains_key(&2));
    }

    #[test]
    fn missing_module_reads_empty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let source = ProcfsTelemetry::new(dir.path().join("smartscheduler"));
        assert!(!source.available());
        assert!(source.read_predictions().is_empty());
        assert!(source.read_stats().is_empty());
        assert_eq!(source.read_counters(), TelemetryCounters::default());
        assert!(source.read_frame().is_empty());
    }

    #[test]
    fn reads_files_from_root() {
        let dir = tempfile::tempdir().expect("tmp dir");
        fs::write(dir.path().join("status"), STATUS).unwrap();
        fs::write(dir.path().join("predictions"), PREDICTIONS).unwrap();
        fs::write(dir.path().join("stats"), STATS).unwrap();

        let source = ProcfsTelemetry::new(dir.path());
        assert!(source.available());
        assert_eq!(source.read_counters().tracked, 37);

        let frame = source.read_frame();
        assert_eq!(frame.predictions.len(), 3);
        assert_eq!(frame.stats[&202].mem_roc, 1600);
    }
}
