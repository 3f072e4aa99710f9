//! `smartmon-engine` – Risk Classification & Enforcement
//!
//! Fuses the live process table with SmartScheduler telemetry, decides what
//! to show and what to terminate, and drives the per-cycle loop.
//!
//! # Modules
//!
//! - [`host`] – [`ProcessHost`][host::ProcessHost]: the OS collaborator
//!   (enumeration, sampling, signals, machine metrics) and its live
//!   `sysinfo` + `nix` implementation [`SystemHost`][host::SystemHost].
//! - [`fusion`] – [`ProcessFusionEngine`][fusion::ProcessFusionEngine]:
//!   joins live samples with predictions, applies the blocklist and the
//!   severity rules and tracks consecutive spikes.
//! - [`selector`] – row selection/ordering and the advisory counts.
//! - [`sequencer`] – [`TerminationSequencer`][sequencer::TerminationSequencer]:
//!   the warning pulse followed by terminate-or-kill, with cancellation.
//! - [`event_log`] – bounded log of enforcement outcomes.
//! - [`cancel`] – [`CancelToken`][cancel::CancelToken]: cooperative shutdown.
//! - [`system`] – system snapshot assembly and the power-supply probe.
//! - [`demo`] – a synthetic process world implementing both the host and the
//!   telemetry interfaces.
//! - [`monitor`] – [`Monitor`][monitor::Monitor]: the poll → enforce → render
//!   loop, the [`DisplayFrame`][monitor::DisplayFrame] render packet and the
//!   [`Renderer`][monitor::Renderer] trait.

pub mod cancel;
pub mod demo;
pub mod event_log;
pub mod fusion;
pub mod host;
pub mod monitor;
pub mod selector;
pub mod sequencer;
pub mod system;

#[cfg(test)]
mod test_support;

pub use cancel::CancelToken;
pub use demo::{DemoHost, DemoTelemetry, DemoWorld};
pub use event_log::EventLog;
pub use fusion::{ProcessFusionEngine, SpikeHistory};
pub use host::{ProcessHost, SystemHost};
pub use monitor::{DisplayFrame, Monitor, MonitorSettings, Renderer};
pub use selector::AdvisorySummary;
pub use sequencer::{PULSE_CYCLES, PULSE_STEPS, PulseMarker, SequenceOutcome, TerminationSequencer};
