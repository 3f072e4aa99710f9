//! Enforcement configuration – reads the blocklist JSON document.
//!
//! ```json
//! {
//!   "blocklist": [
//!     { "name": "stress-ng", "cpu_threshold": 50.0 },
//!     { "name": "cryptominer" }
//!   ],
//!   "safe_apps": ["sshd", "systemd"],
//!   "global_cpu_kill_threshold": 95.0,
//!   "kill_delay_seconds": 2.0,
//!   "kill_signal_timeout": 0.5
//! }
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smartmon_types::MonitorError;

/// One blocklist rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlocklistEntry {
    /// Case-insensitive substring matched against the process name.
    pub name: String,
    /// Per-entry CPU threshold in percent; falls back to the global threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_threshold: Option<f64>,
}

impl BlocklistEntry {
    pub fn new(name: impl Into<String>, cpu_threshold: Option<f64>) -> Self {
        Self {
            name: name.into(),
            cpu_threshold,
        }
    }
}

/// Operator-supplied enforcement rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    #[serde(default)]
    pub blocklist: Vec<BlocklistEntry>,

    /// Names that are never flagged or terminated (exact, case-insensitive).
    #[serde(default)]
    pub safe_apps: Vec<String>,

    #[serde(default = "default_global_threshold")]
    pub global_cpu_kill_threshold: f64,

    /// Pacing delay between kills.  Carried for compatibility; the
    /// sequencer's warning pulse is the only delay currently applied.
    #[serde(default = "default_kill_delay")]
    pub kill_delay_seconds: f64,

    /// Seconds to wait after the graceful terminate request before
    /// escalating to a forceful kill.
    #[serde(default = "default_signal_timeout")]
    pub kill_signal_timeout: f64,
}

fn default_global_threshold() -> f64 {
    95.0
}
fn default_kill_delay() -> f64 {
    2.0
}
fn default_signal_timeout() -> f64 {
    0.5
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            blocklist: Vec::new(),
            safe_apps: Vec::new(),
            global_cpu_kill_threshold: default_global_threshold(),
            kill_delay_seconds: default_kill_delay(),
            kill_signal_timeout: default_signal_timeout(),
        }
    }
}

impl EnforcementConfig {
    /// Read and parse the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, MonitorError> {
        serde_json::from_str(raw)
            .map_err(|e| MonitorError::Config(format!("failed to parse blocklist: {e}")))
    }

    /// `kill_signal_timeout` as a [`Duration`].  Negative or non-finite
    /// values fall back to the default.
    pub fn signal_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.kill_signal_timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_signal_timeout()))
    }

    pub fn kill_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.kill_delay_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_kill_delay()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = EnforcementConfig::from_json("{}").unwrap();
        assert_eq!(cfg, EnforcementConfig::default());
        assert_eq!(cfg.global_cpu_kill_threshold, 95.0);
        assert_eq!(cfg.signal_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.kill_delay(), Duration::from_secs(2));
    }

    #[test]
    fn parses_full_document() {
        let cfg = EnforcementConfig::from_json(
            r#"{
                "blocklist": [
                    {"name": "stress-ng", "cpu_threshold": 50.0},
                    {"name": "cryptominer"}
                ],
                "safe_apps": ["sshd"],
                "global_cpu_kill_threshold": 90,
                "kill_signal_timeout": 1.5
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.blocklist.len(), 2);
        assert_eq!(cfg.blocklist[0].cpu_threshold, Some(50.0));
        assert_eq!(cfg.blocklist[1].cpu_threshold, None);
        assert_eq!(cfg.safe_apps, vec!["sshd".to_string()]);
        assert_eq!(cfg.global_cpu_kill_threshold, 90.0);
        assert_eq!(cfg.kill_delay_seconds, 2.0);
        assert_eq!(cfg.signal_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn negative_timeout_falls_back() {
        let cfg = EnforcementConfig {
            kill_signal_timeout: -3.0,
            ..Default::default()
        };
        assert_eq!(cfg.signal_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EnforcementConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = EnforcementConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }
}
