//! Tracing setup for the shell and the backend.
//!
//! The shell logs to a file described by `LogConfig`, rotating older
//! generations on every start. The backend logs to stderr because its stdout
//! carries the protocol; the shell forwards those lines into its own log.

use std::fs::{File, OpenOptions};
use std::io::LineWriter;
use std::sync::Mutex;

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Log filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "POSTDESK_LOG";

/// Set to `json` for machine-readable log lines.
pub const LOG_FORMAT_ENV: &str = "POSTDESK_LOG_FORMAT";

const DEFAULT_LOG_FILTER: &str = "postdesk=info,warn";

/// The shell's log sink. `fmt` writes each event with a single call ending in
/// a newline, so the line writer puts every event on disk as it happens.
type LogSink = Mutex<LineWriter<File>>;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn json_logs() -> bool {
    matches!(std::env::var(LOG_FORMAT_ENV).ok().as_deref(), Some("json"))
}

/// Initialize tracing for the shell.
///
/// Falls back to stderr when the log file cannot be opened.
pub fn init_shell_tracing(config: &LogConfig) {
    let sink = match open_log(config) {
        Ok(sink) => sink,
        Err(e) => {
            init_stderr_tracing();
            tracing::warn!(path = %config.path().display(), error = %e, "cannot open log file, logging to stderr");
            return;
        }
    };

    let builder = fmt()
        .with_env_filter(env_filter())
        .with_writer(sink)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let _ = if json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %config.path().display(),
        kept_generations = config.keep,
        pid = std::process::id(),
        "=== Postdesk starting ==="
    );
}

/// Initialize tracing to stderr.
pub fn init_stderr_tracing() {
    let builder = fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let _ = if json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Rotate old logs, then open a fresh live file.
fn open_log(config: &LogConfig) -> std::io::Result<LogSink> {
    std::fs::create_dir_all(config.dir())?;
    rotate(config);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.path())?;
    Ok(Mutex::new(LineWriter::new(file)))
}

/// Shift every generation up by one and move the live file to generation 1.
/// Whatever would land past `keep` is deleted; with `keep = 0` the live file
/// is simply discarded.
fn rotate(config: &LogConfig) {
    let live = config.path();
    if config.keep == 0 {
        let _ = std::fs::remove_file(&live);
        return;
    }

    let _ = std::fs::remove_file(config.generation(config.keep));
    for n in (1..config.keep).rev() {
        let from = config.generation(n);
        if from.exists() {
            let _ = std::fs::rename(&from, config.generation(n + 1));
        }
    }
    if live.exists() {
        let _ = std::fs::rename(&live, config.generation(1));
    }
}
