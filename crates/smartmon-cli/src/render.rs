//! [`ConsoleRenderer`] – ANSI console painter for [`DisplayFrame`]s.
//!
//! The screen is redrawn from scratch on every frame: header, process table,
//! advisory panel, recent enforcement events and a footer.  A row under
//! enforcement is painted on an eight-step red ramp indexed by the pulse
//! marker's step.

use std::io::{self, Write};

use colored::{ColoredString, Colorize};
use smartmon_engine::DisplayFrame;
use smartmon_engine::Renderer;
use smartmon_types::{ProcessRecord, Severity, Trend};
use tracing::debug;

/// Background colours of the warning pulse, one per step.
pub const PULSE_RAMP: [(u8, u8, u8); 8] = [
    (0xbc, 0x33, 0x0d),
    (0xc4, 0x2e, 0x09),
    (0xcc, 0x2a, 0x06),
    (0xd5, 0x26, 0x03),
    (0xe3, 0x31, 0x00),
    (0xd5, 0x26, 0x03),
    (0xcc, 0x2a, 0x06),
    (0xc4, 0x2e, 0x09),
];

const NAME_WIDTH: usize = 20;
const IO_BAR_WIDTH: usize = 5;
const IO_BAR_FULL_SCALE: u64 = 5000;
const RULE: &str = "────────────────────────────────────────────────────────────────────────────────────";

pub struct ConsoleRenderer {
    started: bool,
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self { started: false }
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, frame: &DisplayFrame) {
        let mut screen = String::new();
        if !self.started {
            // Hide the cursor for the lifetime of the renderer.
            screen.push_str("\x1b[?25l");
            self.started = true;
        }
        screen.push_str("\x1b[H\x1b[2J");
        screen.push_str(&compose(frame));
        screen.push('\n');

        let mut out = io::stdout().lock();
        if let Err(e) = out.write_all(screen.as_bytes()).and_then(|()| out.flush()) {
            debug!(error = %e, "console write failed");
        }
    }
}

impl Drop for ConsoleRenderer {
    fn drop(&mut self) {
        if self.started {
            let mut out = io::stdout().lock();
            let _ = out.write_all(b"\x1b[?25h").and_then(|()| out.flush());
        }
    }
}

/// Build the complete screen for `frame`.
pub fn compose(frame: &DisplayFrame) -> String {
    let mut lines = header(frame);
    lines.push(String::new());
    lines.extend(table(frame));
    lines.push(String::new());
    lines.extend(advisory(frame));
    lines.push(String::new());
    lines.push(footer(frame));
    lines.join("\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Header
// ────────────────────────────────────────────────────────────────────────────

fn header(frame: &DisplayFrame) -> Vec<String> {
    let s = &frame.snapshot;
    let mut title = format!("{}", " SmartScheduler Monitor ".bold().white().on_blue());
    if frame.demo {
        title.push_str(&format!("  {}", " DEMO ".bold().black().on_yellow()));
    }

    let telemetry = if s.telemetry_available {
        format!(
            "Telemetry: {} tracked, {} predictions",
            s.tracked_processes.to_string().cyan(),
            s.total_predictions.to_string().cyan()
        )
    } else {
        format!("{}", "TELEMETRY OFFLINE".bold().red())
    };

    vec![
        title,
        RULE.dimmed().to_string(),
        format!(
            "CPU: {} cores @ {}   Memory: {:.1} / {:.1} GB ({})",
            s.cpu_count,
            percent_colour(s.cpu_percent, format!("{:.1}%", s.cpu_percent)),
            s.memory_used_gb,
            s.memory_total_gb,
            percent_colour(s.memory_percent, format!("{:.1}%", s.memory_percent)),
        ),
        format!(
            "Load: {:.2} {:.2} {:.2}   Power: {}   {}",
            s.load.one, s.load.five, s.load.fifteen, s.power_state, telemetry
        ),
    ]
}

fn percent_colour(value: f64, text: String) -> ColoredString {
    if value >= 80.0 {
        text.bright_red().bold()
    } else if value >= 50.0 {
        text.yellow()
    } else {
        text.bright_green()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Process table
// ────────────────────────────────────────────────────────────────────────────

fn table(frame: &DisplayFrame) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{:>7}  {:<name$}  {:>7}  {:>9}  {:<5}  {:^5}  {:<8}  {}",
            "PID",
            "NAME",
            "CPU %",
            "MEMORY",
            "I/O",
            "TREND",
            "ALERT",
            "STATUS",
            name = NAME_WIDTH
        )
        .bold()
        .to_string(),
    ];

    if frame.rows.is_empty() {
        lines.push(format!("{:>7}  {}", "—", "No active processes".dimmed()));
        return lines;
    }

    for record in &frame.rows {
        let pulse_step = frame
            .pulse
            .filter(|p| p.pid == record.pid)
            .map(|p| usize::from(p.step) % PULSE_RAMP.len());
        lines.push(match pulse_step {
            Some(step) => pulse_row(record, step),
            None => row(record),
        });
    }
    lines
}

fn truncated_name(name: &str) -> String {
    name.chars().take(NAME_WIDTH).collect()
}

/// Whole row painted on the pulse colour, no per-cell styling.
fn pulse_row(record: &ProcessRecord, step: usize) -> String {
    let (r, g, b) = PULSE_RAMP[step];
    let text = format!(
        "{:>7}  {:<name$}  {:>6.1}%  {:>9}  {:<5}  {:^5}  {:<8}  {}",
        record.pid,
        truncated_name(&record.name),
        record.cpu_percent,
        fmt_memory(record.memory_mb),
        io_bar(record.stats.io_roc),
        record.trend.symbol(),
        record.severity.label(),
        "⛔ TERMINATING",
        name = NAME_WIDTH
    );
    text.white().bold().on_truecolor(r, g, b).to_string()
}

fn row(record: &ProcessRecord) -> String {
    let name = format!("{:<width$}", truncated_name(&record.name), width = NAME_WIDTH);
    let name = if record.blocklisted { name.bold() } else { name.normal() };

    let cpu = format!("{:>6.1}%", record.cpu_percent);
    let cpu = match record.cpu_percent {
        c if c >= 80.0 => cpu.bright_red().bold(),
        c if c >= 50.0 => cpu.yellow(),
        c if c >= 20.0 => cpu.bright_yellow(),
        _ => cpu.bright_green(),
    };

    let bar = io_bar(record.stats.io_roc);
    let filled = bar.chars().filter(|&c| c == '█').count();
    let bar = match filled {
        f if f >= 4 => bar.bright_red(),
        f if f >= 2 => bar.yellow(),
        _ => bar.green(),
    };

    let trend = format!("{:^5}", record.trend.symbol());
    let trend = match record.trend {
        Trend::Rising => trend.bright_red().bold(),
        Trend::Falling => trend.bright_green(),
        Trend::Flat => trend.bright_black(),
    };

    let alert = format!("{:<8}", record.severity.label());
    let alert = match record.severity {
        Severity::Critical => alert.white().on_red().bold(),
        Severity::High => alert.bright_red().bold(),
        Severity::Medium => alert.yellow(),
        Severity::Low => alert.cyan(),
        Severity::Warning => alert.magenta(),
        Severity::Normal => alert.green(),
    };

    format!(
        "{:>7}  {}  {}  {:>9}  {}  {}  {}  {}",
        record.pid,
        name,
        cpu,
        fmt_memory(record.memory_mb),
        bar,
        trend,
        alert,
        status(record)
    )
}

fn status(record: &ProcessRecord) -> ColoredString {
    if record.blocklisted {
        return "⛔ KILL".bright_red().bold();
    }
    if record.safe {
        return "✓ SAFE".bright_blue();
    }
    let kinds: Vec<&str> = [
        (record.spikes.cpu, "CPU"),
        (record.spikes.mem, "MEM"),
        (record.spikes.io, "I/O"),
    ]
    .into_iter()
    .filter_map(|(hit, label)| hit.then_some(label))
    .collect();
    if kinds.is_empty() {
        "✓ OK".bright_black()
    } else {
        format!("⚡ {}", kinds.join("+")).yellow()
    }
}

pub fn fmt_memory(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{:.0} MB", mb)
    }
}

/// Five-cell bar scaled to an I/O rate-of-change of 5000.
pub fn io_bar(io_roc: i64) -> String {
    let magnitude = io_roc.unsigned_abs().min(IO_BAR_FULL_SCALE);
    let filled = (magnitude * IO_BAR_WIDTH as u64 / IO_BAR_FULL_SCALE) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(IO_BAR_WIDTH - filled))
}

// ────────────────────────────────────────────────────────────────────────────
// Advisory + footer
// ────────────────────────────────────────────────────────────────────────────

fn advisory(frame: &DisplayFrame) -> Vec<String> {
    let a = &frame.advisory;
    let mut lines = vec![format!("{}", " Advisory Summary ".bold().black().on_yellow())];

    let spike_line = |count: usize, label: &str, icon: &str| {
        if count > 0 {
            format!("  {icon} {label} Spikes: {count} detected").bright_red().to_string()
        } else {
            format!("  ✓ {label}: No spikes").bright_green().to_string()
        }
    };
    lines.push(spike_line(a.cpu_spikes, "CPU", "🔥"));
    lines.push(spike_line(a.mem_spikes, "MEM", "💾"));
    lines.push(spike_line(a.io_spikes, "I/O", "📀"));

    if a.blocklisted > 0 {
        lines.push(
            format!(
                "  ⛔ BLOCKLISTED: {} process(es) flagged for termination",
                a.blocklisted
            )
            .bright_red()
            .bold()
            .to_string(),
        );
    }
    if a.persistent > 0 {
        lines.push(
            format!(
                "  ⚠  PERSISTENT: {} process(es) spiking for {}+ samples",
                a.persistent,
                smartmon_types::PERSISTENT_SPIKE_POLLS
            )
            .red()
            .bold()
            .to_string(),
        );
    }
    for event in &frame.events {
        lines.push(format!("  {}", event.to_string().dimmed()));
    }
    lines
}

fn footer(frame: &DisplayFrame) -> String {
    let shown = if frame.settings.show_all {
        "all".to_string()
    } else {
        format!("top {}", frame.settings.top_n)
    };
    format!(
        "  {} {}  │  {} shown  │  {} to exit  │  {}=Spike {}=Normal {}=Trend",
        "Refresh:".dimmed(),
        format!("{}ms", frame.settings.interval.as_millis()).cyan(),
        shown.cyan(),
        "Ctrl+C".bold().yellow(),
        "█".red(),
        "░".bright_black(),
        "↑↓→".cyan()
    )
}
