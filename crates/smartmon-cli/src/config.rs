//! Settings Vault – reads/writes `~/.smartmon/config.toml`.
//!
//! Precedence, lowest first: built-in defaults, the settings file,
//! `SMARTMON_*` environment variables, command-line flags.

use serde::{Deserialize, Serialize};
use smartmon_telemetry::procfs::DEFAULT_ROOT;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persisted console settings stored in `~/.smartmon/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Refresh interval in milliseconds (clamped to ≥ 100 at runtime).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Rows shown when not all processes are interesting.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default)]
    pub show_all: bool,

    /// Directory holding the scheduler's `status`, `predictions` and `stats`.
    #[serde(default = "default_telemetry_root")]
    pub telemetry_root: PathBuf,

    /// Enforcement configuration; `~/.smartmon/blocklist.json` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocklist_path: Option<PathBuf>,
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_top_n() -> usize {
    20
}
fn default_telemetry_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            top_n: default_top_n(),
            show_all: false,
            telemetry_root: default_telemetry_root(),
            blocklist_path: None,
        }
    }
}

impl Settings {
    pub fn blocklist_path(&self) -> PathBuf {
        self.blocklist_path
            .clone()
            .unwrap_or_else(default_blocklist_path)
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return the path to `~/.smartmon/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".smartmon").join("config.toml")
}

/// Return the path to `~/.smartmon/blocklist.json`.
pub fn default_blocklist_path() -> PathBuf {
    PathBuf::from(home_dir()).join(".smartmon").join("blocklist.json")
}

/// Effective settings: file (or defaults) plus environment overrides.
///
/// A broken settings file is reported and replaced by defaults.
pub fn load() -> Settings {
    let mut settings = match load_from(&config_path()) {
        Ok(found) => found.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "using default settings");
            Settings::default()
        }
    };
    apply_env_overrides(&mut settings);
    settings
}

/// Load the settings from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Settings>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings at {}: {}", path.display(), e))?;
    let settings: Settings =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse settings: {}", e))?;
    Ok(Some(settings))
}

/// Apply `SMARTMON_*` environment variable overrides to `settings`.
///
/// | Variable | Field |
/// |---|---|
/// | `SMARTMON_INTERVAL_MS` | `interval_ms` |
/// | `SMARTMON_TOP` | `top_n` |
/// | `SMARTMON_TELEMETRY_ROOT` | `telemetry_root` |
/// | `SMARTMON_BLOCKLIST` | `blocklist_path` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var("SMARTMON_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        settings.interval_ms = ms;
    }
    if let Ok(v) = std::env::var("SMARTMON_TOP")
        && let Ok(n) = v.parse::<usize>()
    {
        settings.top_n = n;
    }
    if let Ok(v) = std::env::var("SMARTMON_TELEMETRY_ROOT") {
        settings.telemetry_root = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("SMARTMON_BLOCKLIST") {
        settings.blocklist_path = Some(PathBuf::from(v));
    }
}

/// Save the settings to disk, creating `~/.smartmon/` if necessary.
pub fn save(settings: &Settings) -> Result<PathBuf, String> {
    let path = config_path();
    save_to(settings, &path)?;
    Ok(path)
}

pub(crate) fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set settings directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write settings at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write settings at {}: {}", path.display(), e))?;
    Ok(())
}
