//! `smartmon` – SmartScheduler Monitor
//!
//! Live console for the SmartScheduler kernel module.  It:
//!
//! 1. Loads `~/.smartmon/config.toml`, `SMARTMON_*` overrides and flags.
//! 2. Loads the enforcement blocklist (`~/.smartmon/blocklist.json`).
//! 3. Polls processes, fuses them with `/proc/smartscheduler` predictions and
//!    redraws the table every interval, or plays a synthetic world with
//!    `--demo`.
//! 4. Terminates blocklisted processes after a visible warning pulse.
//! 5. Intercepts **Ctrl-C**, aborting any in-flight pulse without a kill.

mod args;
mod config;
mod logging;
mod render;

use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

use smartmon_engine::demo::install_demo_blocklist;
use smartmon_engine::{CancelToken, DemoWorld, Monitor, MonitorSettings, ProcessFusionEngine, SystemHost};
use smartmon_policy::BlocklistPolicy;
use smartmon_telemetry::{ProcfsTelemetry, TelemetrySource};

use crate::args::Args;
use crate::render::ConsoleRenderer;

fn main() {
    let args = Args::parse();

    // ── Structured logging ────────────────────────────────────────────────
    if let Err(e) = logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("{}: {}", "Logging disabled".yellow(), e);
    }

    // ── Settings ──────────────────────────────────────────────────────────
    let mut settings = config::load();
    args.apply(&mut settings);

    if args.save_config {
        match config::save(&settings) {
            Ok(path) => println!(
                "  {} Settings saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            ),
            Err(e) => {
                eprintln!("{}: {}", "Error saving settings".red(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let cancel = CancelToken::new();
    let cancel_on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || cancel_on_signal.cancel()) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop with SIGKILL instead");
    }

    // ── Policy + collaborators ────────────────────────────────────────────
    let blocklist_path = settings.blocklist_path();
    let mut policy = BlocklistPolicy::load_or_default(&blocklist_path);
    let monitor_settings = MonitorSettings::new(settings.interval_ms, settings.top_n, settings.show_all);

    print_banner(args.demo);

    let mut monitor = if args.demo {
        install_demo_blocklist(&mut policy);
        let (host, telemetry) = DemoWorld::new().split();
        let engine = ProcessFusionEngine::new(policy, Box::new(telemetry));
        Monitor::new(
            Box::new(host),
            engine,
            Box::new(ConsoleRenderer::new()),
            monitor_settings,
        )
        .demo(true)
    } else {
        let telemetry = ProcfsTelemetry::new(settings.telemetry_root.clone());
        if !telemetry.available() {
            warn!(
                root = %settings.telemetry_root.display(),
                "scheduler telemetry not found; running with live metrics only"
            );
            println!(
                "  {} {} not found – is the module loaded?  Try {} for a preview.",
                "⚠".yellow().bold(),
                settings.telemetry_root.display().to_string().bold(),
                "--demo".bold().cyan()
            );
        }
        let engine = ProcessFusionEngine::new(policy, Box::new(telemetry));
        Monitor::new(
            Box::new(SystemHost::new()),
            engine,
            Box::new(ConsoleRenderer::new()),
            monitor_settings,
        )
    };

    info!(blocklist = %blocklist_path.display(), demo = args.demo, "starting monitor");
    monitor.run(&cancel);

    // Dropping the monitor drops the renderer, which restores the cursor.
    drop(monitor);
    println!();
    println!("{}", "  ✓ Monitor stopped.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(demo: bool) {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     SmartScheduler Process Monitor   ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    if demo {
        println!("  {}", "Demo mode: synthetic processes, nothing is signalled.".dimmed());
    }
    println!();
}
