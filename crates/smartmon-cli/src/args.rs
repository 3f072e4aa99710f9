//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;

const EXAMPLES: &str = "\
Examples:
  smartmon                       # live monitoring
  smartmon --demo                # synthetic data, no kernel module needed
  smartmon --interval 500 --top 30
  smartmon --all                 # show every tracked process
  smartmon -b ./blocklist.json   # custom enforcement rules";

/// SmartScheduler process monitor and enforcer.
#[derive(Debug, Parser)]
#[command(name = "smartmon", version, after_help = EXAMPLES)]
pub struct Args {
    /// Refresh interval in milliseconds (minimum 100) [default: 1000]
    #[arg(short, long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Show the top N processes [default: 20]
    #[arg(short, long, value_name = "N")]
    pub top: Option<usize>,

    /// Show all tracked processes
    #[arg(short, long)]
    pub all: bool,

    /// Run against synthetic demo data
    #[arg(short, long)]
    pub demo: bool,

    /// Path to the blocklist JSON [default: ~/.smartmon/blocklist.json]
    #[arg(short, long, value_name = "PATH")]
    pub blocklist: Option<PathBuf>,

    /// Directory exported by the scheduler module [default: /proc/smartscheduler]
    #[arg(long, value_name = "DIR")]
    pub telemetry_root: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Write the effective settings to ~/.smartmon/config.toml and exit
    #[arg(long)]
    pub save_config: bool,
}

impl Args {
    /// Layer the flags that were actually given on top of `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(ms) = self.interval {
            settings.interval_ms = ms;
        }
        if let Some(n) = self.top {
            settings.top_n = n;
        }
        if self.all {
            settings.show_all = true;
        }
        if let Some(path) = &self.blocklist {
            settings.blocklist_path = Some(path.clone());
        }
        if let Some(root) = &self.telemetry_root {
            settings.telemetry_root = root.clone();
        }
    }
}
