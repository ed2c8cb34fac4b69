//! Run log for the urivstat binaries
//!
//! Each export or aggregation run appends to `$XDG_STATE_HOME/urivstat/urivstat.log.<date>`.
//! The log records the snapshot and output directories of a run, per-table
//! counts of dropped rows (bad timestamps, unresolvable identities, records
//! after the as-of cutoff), tables missing from a snapshot, and the row count
//! of every summary file written. Nothing goes to the terminal, so CLI output
//! stays clean for `--format json`.

use crate::config::{Config, LoggingConfig};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Install the run log as the global subscriber.
///
/// The level comes from `RUST_LOG` when set, otherwise from `[logging] level`.
/// One file per day is kept up to `[logging] max_files`. Hold the returned
/// guard until the run ends or buffered lines are lost.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("urivstat.log")
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| crate::error::Error::Config(format!("failed to create log file: {}", e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "urivstat run log opened"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Route log lines to the test harness output.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Flushes the run log when dropped.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Base path of the run log; the daily files carry a `.<date>` suffix.
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path();
        assert!(path.ends_with("urivstat.log"));
        assert_eq!(path.parent(), Some(Config::state_dir().as_path()));
    }
}
