//! `smartmon-policy` – Enforcement Policy
//!
//! Decides which processes the monitor is allowed to terminate.  It does not
//! signal anything itself; it answers name and threshold questions for the
//! fusion engine and the termination sequencer.
//!
//! # Modules
//!
//! - [`config`] – [`EnforcementConfig`][config::EnforcementConfig]: the JSON
//!   document holding the blocklist, the safe-app list and the kill timing
//!   knobs, with a default for every key.
//! - [`blocklist`] – [`BlocklistPolicy`][blocklist::BlocklistPolicy]: the
//!   evaluated form of the configuration.  Membership (substring match) gates
//!   enforcement; the CPU threshold check gates `CRITICAL` severity.  The
//!   safe list overrides both.

pub mod blocklist;
pub mod config;

pub use blocklist::BlocklistPolicy;
pub use config::{BlocklistEntry, EnforcementConfig};
