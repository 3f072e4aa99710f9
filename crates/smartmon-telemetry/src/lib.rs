//! `smartmon-telemetry` – predictive telemetry ingestion.
//!
//! Reads the spike predictions and EMA / rate-of-change statistics that the
//! SmartScheduler kernel module publishes under `/proc/smartscheduler`.
//!
//! # Modules
//!
//! - [`source`] – [`TelemetrySource`][source::TelemetrySource]: the read-only
//!   contract every telemetry provider implements (the live `/proc` reader and
//!   the demo generator).
//! - [`procfs`] – [`ProcfsTelemetry`][procfs::ProcfsTelemetry]: parses the
//!   line-oriented status, prediction and statistics tables.  A missing module
//!   is reported as unavailable telemetry, never as an error.

pub mod procfs;
pub mod source;

pub use procfs::{ProcfsTelemetry, parse_predictions, parse_stats, parse_status};
pub use source::TelemetrySource;
