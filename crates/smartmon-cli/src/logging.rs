//! Logging initialisation.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"warn"`; stdout belongs to the live console). |
//! | `SMARTMON_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! Logs go to stderr unless a log file is given and can be opened.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Install the global `tracing` subscriber.  Call once, before anything logs.
///
/// A log file that cannot be opened falls back to stderr and is reported
/// through the installed subscriber.
pub fn init_tracing(log_file: Option<&Path>) -> Result<(), String> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    let use_json = std::env::var("SMARTMON_LOG_FORMAT").as_deref() == Ok("json");

    let target = LogTarget::open(log_file);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(target.ansi)
        .with_writer(target.writer);

    let result = if use_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| format!("Failed to install log subscriber: {}", e))?;

    if let Some(e) = target.fallback {
        warn!(error = %e, "logging to stderr instead");
    }
    Ok(())
}

/// Where log lines go.
struct LogTarget {
    writer: BoxMakeWriter,
    ansi: bool,
    /// Why the requested log file was not used.
    fallback: Option<String>,
}

impl LogTarget {
    fn open(log_file: Option<&Path>) -> Self {
        let Some(path) = log_file else {
            return Self::stderr(None);
        };
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                writer: BoxMakeWriter::new(Mutex::new(file)),
                ansi: false,
                fallback: None,
            },
            Err(e) => Self::stderr(Some(format!(
                "Failed to open log file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn stderr(fallback: Option<String>) -> Self {
        Self {
            writer: BoxMakeWriter::new(std::io::stderr),
            ansi: true,
            fallback,
        }
    }
}
