//! Console and daily-rolling file logging.
//!
//! `fmv-core` logs through the `log` facade; its records are bridged into
//! the `tracing` subscriber installed here.

use std::path::Path;
use std::time::{Duration, SystemTime};
use std::{fs, io};

use chrono::Local;
use log::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Prefix of the rolling log files; the appender adds a date suffix.
const LOG_FILE_PREFIX: &str = "fmv-ingest.log";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Install the global subscriber. `level` is a filter directive used when
/// `RUST_LOG` is unset and `verbose` is off; an invalid one is an error.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// keeps it alive until exit.
pub fn init_logging(
    log_dir: &Path,
    retention_days: u64,
    verbose: bool,
    level: Option<&str>,
) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;
    let removed = remove_expired_logs(log_dir, Duration::from_secs(retention_days * SECS_PER_DAY))?;

    let directive = if verbose { "debug" } else { level.unwrap_or("info") };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive)?,
    };

    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stdout).with_timer(LocalTime))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_timer(LocalTime),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    if removed > 0 {
        info!("Removed {} log file(s) older than {} day(s)", removed, retention_days);
    }
    Ok(guard)
}

/// Delete rolling log files in `dir` last modified longer than `retention`
/// ago. Returns how many were removed; other files are left alone.
fn remove_expired_logs(dir: &Path, retention: Duration) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in fs::read_dir(dir)?.flatten() {
        let is_log = entry.file_type().is_ok_and(|t| t.is_file())
            && entry.file_name().to_str().is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.is_some_and(|age| age > retention) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            // the subscriber is not installed yet
            Err(e) => eprintln!("Failed to remove old log file {:?}: {}", entry.path(), e),
        }
    }
    Ok(removed)
}

/// Local wall-clock timestamps with millisecond precision.
#[derive(Debug, Clone, Copy)]
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}
