//! Orchestration loop.
//!
//! One [`Monitor::tick`] is: poll → system snapshot → enforcement batch over
//! blocklisted records → drop handled pids → render.  [`Monitor::run`] repeats
//! ticks until the [`CancelToken`] fires, sleeping the configured interval in
//! short slices in between.
//!
//! The loop is single-threaded and cooperative: a warning pulse and the
//! terminate-or-kill that follows block it, so at most one termination
//! sequence is ever in flight.

use std::path::Path;
use std::time::Duration;

use smartmon_types::{EnforcementEvent, ProcessRecord, SystemSnapshot};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::event_log::EventLog;
use crate::fusion::ProcessFusionEngine;
use crate::host::ProcessHost;
use crate::selector::{AdvisorySummary, advisory, select};
use crate::sequencer::{DEFAULT_FRAME_DURATION, PulseMarker, TerminationSequencer};
use crate::system::{PowerProbe, snapshot};

pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
/// Enforcement events carried in each [`DisplayFrame`].
pub const RECENT_EVENTS: usize = 3;

/// Display and pacing options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub top_n: usize,
    pub show_all: bool,
    pub frame_duration: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::new(1000, 20, false)
    }
}

impl MonitorSettings {
    /// `interval_ms` is clamped to at least 100 ms.
    pub fn new(interval_ms: u64, top_n: usize, show_all: bool) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms).max(MIN_INTERVAL),
            top_n,
            show_all,
            frame_duration: DEFAULT_FRAME_DURATION,
        }
    }

    pub fn with_frame_duration(mut self, frame_duration: Duration) -> Self {
        self.frame_duration = frame_duration;
        self
    }
}

/// Everything a renderer needs for one screen.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub snapshot: SystemSnapshot,
    /// Selected rows, in display order.
    pub rows: Vec<ProcessRecord>,
    pub advisory: AdvisorySummary,
    /// Most recent enforcement events, oldest first.
    pub events: Vec<EnforcementEvent>,
    pub pulse: Option<PulseMarker>,
    pub demo: bool,
    pub settings: MonitorSettings,
}

/// A surface that can paint a [`DisplayFrame`].
pub trait Renderer {
    fn render(&mut self, frame: &DisplayFrame);
}

fn build_frame(
    settings: MonitorSettings,
    demo: bool,
    snapshot: &SystemSnapshot,
    records: &[ProcessRecord],
    log: &EventLog,
    pulse: Option<PulseMarker>,
) -> DisplayFrame {
    DisplayFrame {
        snapshot: snapshot.clone(),
        rows: select(records, settings.top_n, settings.show_all),
        advisory: advisory(records),
        events: log.recent(RECENT_EVENTS).cloned().collect(),
        pulse,
        demo,
        settings,
    }
}

/// Outcome of one [`Monitor::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub records: usize,
    pub targets: usize,
    pub handled: usize,
}

pub struct Monitor {
    host: Box<dyn ProcessHost>,
    engine: ProcessFusionEngine,
    sequencer: TerminationSequencer,
    power: PowerProbe,
    renderer: Box<dyn Renderer>,
    settings: MonitorSettings,
    demo: bool,
    ticks: u64,
}

impl Monitor {
    pub fn new(
        host: Box<dyn ProcessHost>,
        engine: ProcessFusionEngine,
        renderer: Box<dyn Renderer>,
        settings: MonitorSettings,
    ) -> Self {
        let sequencer =
            TerminationSequencer::new(settings.frame_duration, engine.policy().signal_timeout());
        Self {
            host,
            engine,
            sequencer,
            power: PowerProbe::default(),
            renderer,
            settings,
            demo: false,
            ticks: 0,
        }
    }

    pub fn demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    pub fn with_power_probe(mut self, power: PowerProbe) -> Self {
        self.power = power;
        self
    }

    /// Run until `cancel` fires.
    pub fn run(&mut self, cancel: &CancelToken) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            top_n = self.settings.top_n,
            demo = self.demo,
            "monitor started"
        );
        while !cancel.is_cancelled() {
            self.tick(cancel);
            if cancel.sleep(self.settings.interval) {
                break;
            }
        }
        info!(ticks = self.ticks, "monitor stopped");
    }

    /// One poll / enforce / render cycle.
    pub fn tick(&mut self, cancel: &CancelToken) -> TickReport {
        self.ticks += 1;
        let mut records = self.engine.poll(self.host.as_mut());
        let snap = snapshot(
            &self.host.system_metrics(),
            self.power.probe(),
            self.engine.telemetry_available(),
            self.engine.telemetry_counters(),
        );

        let targets: Vec<ProcessRecord> = records
            .iter()
            .filter(|r| r.is_enforcement_target())
            .cloned()
            .collect();

        let mut handled = 0;
        if !targets.is_empty() {
            debug!(count = targets.len(), "enforcement targets found");
            let settings = self.settings;
            let demo = self.demo;
            let renderer = &mut self.renderer;
            let done = self.sequencer.run_batch(
                &targets,
                &records,
                self.host.as_mut(),
                cancel,
                |rows, marker, log| {
                    renderer.render(&build_frame(settings, demo, &snap, rows, log, Some(marker)));
                },
            );
            records.retain(|r| !done.contains(&r.pid));
            handled = done.len();
        }

        let frame = build_frame(
            self.settings,
            self.demo,
            &snap,
            &records,
            self.sequencer.log(),
            None,
        );
        self.renderer.render(&frame);

        TickReport {
            records: records.len() + handled,
            targets: targets.len(),
            handled,
        }
    }

    /// Swap in the enforcement configuration at `path`; on failure the
    /// current rules stay active.
    pub fn reload_policy(&mut self, path: &Path) -> bool {
        let ok = self.engine.reload_policy(path);
        if ok {
            self.sequencer
                .set_signal_timeout(self.engine.policy().signal_timeout());
        }
        ok
    }

    pub fn events(&self) -> &EventLog {
        self.sequencer.log()
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
