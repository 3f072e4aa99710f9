//! [`BlocklistPolicy`] – evaluated blocklist / safe-list rules.
//!
//! Names are lower-cased once at construction so every query is a plain
//! string comparison.
//!
//! # Example
//!
//! ```
//! use smartmon_policy::{BlocklistEntry, BlocklistPolicy, EnforcementConfig};
//!
//! let policy = BlocklistPolicy::new(EnforcementConfig {
//!     blocklist: vec![BlocklistEntry::new("stress-ng", Some(50.0))],
//!     safe_apps: vec!["sshd".to_string()],
//!     ..Default::default()
//! });
//!
//! assert!(policy.is_monitored("STRESS-NG-worker"));
//! assert!(policy.check_threshold("stress-ng", 60.0));
//! assert!(!policy.check_threshold("sshd", 100.0));
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{BlocklistEntry, EnforcementConfig};

/// A blocklist entry with its matcher pre-normalised.
#[derive(Debug, Clone)]
struct Matcher {
    needle: String,
    cpu_threshold: Option<f64>,
}

/// Membership, safe-list and threshold predicates over an
/// [`EnforcementConfig`].
#[derive(Debug, Clone)]
pub struct BlocklistPolicy {
    config: EnforcementConfig,
    matchers: Vec<Matcher>,
    safe: HashSet<String>,
}

impl Default for BlocklistPolicy {
    fn default() -> Self {
        Self::new(EnforcementConfig::default())
    }
}

impl BlocklistPolicy {
    pub fn new(config: EnforcementConfig) -> Self {
        let matchers = config
            .blocklist
            .iter()
            .filter_map(|entry| {
                let needle = entry.name.trim().to_lowercase();
                if needle.is_empty() {
                    // An empty substring would match every process.
                    warn!("ignoring blocklist entry with an empty name");
                    return None;
                }
                Some(Matcher {
                    needle,
                    cpu_threshold: entry.cpu_threshold,
                })
            })
            .collect();
        let safe = config.safe_apps.iter().map(|s| s.to_lowercase()).collect();
        Self {
            config,
            matchers,
            safe,
        }
    }

    /// Load the policy from `path`, falling back to defaults when the file is
    /// missing or unusable.  Never fails.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "no blocklist file, using defaults");
            return Self::default();
        }
        match EnforcementConfig::load(path) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    entries = config.blocklist.len(),
                    safe = config.safe_apps.len(),
                    "blocklist loaded"
                );
                Self::new(config)
            }
            Err(e) => {
                warn!(error = %e, "could not load blocklist, using defaults");
                Self::default()
            }
        }
    }

    /// Replace the configuration with the one at `path`.
    ///
    /// Returns `false` and keeps the current rules when the file cannot be
    /// read or parsed.
    pub fn reload(&mut self, path: &Path) -> bool {
        match EnforcementConfig::load(path) {
            Ok(config) => {
                *self = Self::new(config);
                info!(path = %path.display(), "blocklist reloaded");
                true
            }
            Err(e) => {
                warn!(error = %e, "blocklist reload failed, keeping previous rules");
                false
            }
        }
    }

    /// Append `entry` unless an entry with the same name already exists.
    pub fn ensure_entry(&mut self, entry: BlocklistEntry) {
        let exists = self
            .config
            .blocklist
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(&entry.name));
        if exists {
            return;
        }
        debug!(name = %entry.name, "adding blocklist entry");
        let mut config = self.config.clone();
        config.blocklist.push(entry);
        *self = Self::new(config);
    }

    /// Exact, case-insensitive match against the safe-app list.
    pub fn is_safe(&self, name: &str) -> bool {
        self.safe.contains(&name.to_lowercase())
    }

    /// `true` when `name` is not safe and contains some blocklist entry name
    /// (case-insensitive).  This alone makes a process an enforcement target.
    pub fn is_monitored(&self, name: &str) -> bool {
        if self.is_safe(name) {
            return false;
        }
        let lower = name.to_lowercase();
        self.matchers.iter().any(|m| lower.contains(&m.needle))
    }

    /// `true` when `cpu_percent` reaches the threshold of a matching entry,
    /// or the global threshold whether or not anything matches.
    ///
    /// Safe names are never flagged.
    pub fn check_threshold(&self, name: &str, cpu_percent: f64) -> bool {
        if self.is_safe(name) {
            return false;
        }
        let global = self.config.global_cpu_kill_threshold;
        let lower = name.to_lowercase();
        let entry_hit = self
            .matchers
            .iter()
            .filter(|m| lower.contains(&m.needle))
            .any(|m| cpu_percent >= m.cpu_threshold.unwrap_or(global));
        entry_hit || cpu_percent >= global
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    pub fn global_threshold(&self) -> f64 {
        self.config.global_cpu_kill_threshold
    }

    pub fn signal_timeout(&self) -> Duration {
        self.config.signal_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn policy() -> BlocklistPolicy {
        BlocklistPolicy::new(EnforcementConfig {
            blocklist: vec![
                BlocklistEntry::new("stress-ng", Some(50.0)),
                BlocklistEntry::new("Miner", None),
            ],
            safe_apps: vec!["sshd".to_string(), "Xorg".to_string()],
            global_cpu_kill_threshold: 95.0,
            ..Default::default()
        })
    }

    #[test]
    fn entry_threshold_applies() {
        let p = policy();
        assert!(p.check_threshold("stress-ng", 60.0));
        assert!(!p.check_threshold("stress-ng", 40.0));
        assert!(p.check_threshold("stress-ng", 50.0), "threshold is inclusive");
    }

    #[test]
    fn global_threshold_applies_without_match() {
        let p = policy();
        assert!(p.check_threshold("randomhog", 96.0));
        assert!(!p.check_threshold("randomhog", 94.9));
        assert!(!p.is_monitored("randomhog"));
    }

    #[test]
    fn entry_without_threshold_uses_global() {
        let p = policy();
        assert!(!p.check_threshold("cryptominer", 90.0));
        assert!(p.check_threshold("cryptominer", 95.0));
    }

    #[test]
    fn safe_names_are_never_flagged() {
        let p = policy();
        for cpu in [0.0, 50.0, 95.0, 100.0, 1000.0] {
            assert!(!p.check_threshold("sshd", cpu));
            assert!(!p.check_threshold("SSHD", cpu));
        }
    }

    #[test]
    fn membership_is_case_insensitive_substring() {
        let p = policy();
        assert!(p.is_monitored("STRESS-NG"));
        assert!(p.is_monitored("stress-ng-cpu"));
        assert!(p.is_monitored("xmrig-miner"));
        assert!(!p.is_monitored("stress"));
    }

    #[test]
    fn safe_list_overrides_membership() {
        let p = BlocklistPolicy::new(EnforcementConfig {
            blocklist: vec![BlocklistEntry::new("ssh", None)],
            safe_apps: vec!["sshd".to_string()],
            ..Default::default()
        });
        assert!(!p.is_monitored("sshd"));
        assert!(p.is_monitored("ssh-agent"));
        assert!(p.is_safe("SshD"));
    }

    #[test]
    fn safe_match_is_exact() {
        let p = policy();
        assert!(p.is_safe("xorg"));
        assert!(!p.is_safe("xorg-helper"));
    }

    #[test]
    fn empty_entry_name_matches_nothing() {
        let p = BlocklistPolicy::new(EnforcementConfig {
            blocklist: vec![BlocklistEntry::new("  ", Some(0.0))],
            ..Default::default()
        });
        assert!(!p.is_monitored("anything"));
        assert!(!p.check_threshold("anything", 1.0));
    }

    #[test]
    fn load_or_default_handles_missing_and_malformed() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let missing = BlocklistPolicy::load_or_default(&dir.path().join("absent.json"));
        assert!(missing.config().blocklist.is_empty());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "[[[").unwrap();
        let p = BlocklistPolicy::load_or_default(&bad);
        assert_eq!(p.global_threshold(), 95.0);
    }

    #[test]
    fn reload_keeps_previous_rules_on_failure() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"blocklist":[{"name":"yes"}]}"#).unwrap();

        let mut p = policy();
        assert!(!p.reload(&dir.path().join("absent.json")));
        assert!(p.is_monitored("stress-ng"));

        assert!(p.reload(&good));
        assert!(p.is_monitored("yes-daemon"));
        assert!(!p.is_monitored("stress-ng"));
    }

    #[test]
    fn ensure_entry_does_not_duplicate() {
        let mut p = policy();
        p.ensure_entry(BlocklistEntry::new("STRESS-NG", Some(10.0)));
        assert_eq!(p.config().blocklist.len(), 2);
        assert!(!p.check_threshold("stress-ng", 20.0));

        p.ensure_entry(BlocklistEntry::new("hog", Some(10.0)));
        assert!(p.is_monitored("hog"));
        assert!(p.check_threshold("hog", 20.0));
    }
}
