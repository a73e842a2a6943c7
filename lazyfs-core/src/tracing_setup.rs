//! Tracing setup for lazyfs
//!
//! Console output shows the progress of a run at the level the user picks;
//! a log file next to it always captures everything down to TRACE, including
//! per-file admission decisions.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the full log of the most recent run.
pub const LOG_FILE_NAME: &str = "lazyfs-last-run.log";

/// Returns where the full log is written for `logs_dir` (default `./logs`).
pub fn log_file_path(logs_dir: Option<&Path>) -> PathBuf {
    logs_dir.unwrap_or_else(|| Path::new("logs")).join(LOG_FILE_NAME)
}

/// Initializes console and file logging and returns the log file path.
///
/// `RUST_LOG` overrides `console_level` for the console layer only. The file
/// is truncated on every run.
///
/// # Errors
///
/// - `LazyError::Io` - Logs directory cannot be created or log file cannot be opened
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> crate::Result<PathBuf> {
    let log_file_path = log_file_path(logs_dir);
    if let Some(parent) = log_file_path.parent() {
        create_dir_all(parent)?;
    }
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    // Wall-clock timestamps mean nothing for a simulated run. Stdout is
    // left to command output such as generated scripts and JSON reports.
    let console_layer = fmt::layer()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(
        console = %console_level,
        file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Dropped requests and other warnings
    Warn,
    /// Progress of every request
    #[default]
    Info,
    /// Admission decisions and worker lifecycle
    Debug,
    /// Every wake-up and wait
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Level::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(Level::from(CliLogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(CliLogLevel::default()), Level::INFO);
    }

    #[test]
    fn test_parse_from_cli_value() {
        assert_eq!(
            CliLogLevel::from_str("debug", true),
            Ok(CliLogLevel::Debug)
        );
        assert!(CliLogLevel::from_str("loud", true).is_err());
    }

    #[test]
    fn test_log_file_path() {
        assert_eq!(log_file_path(None), PathBuf::from("logs").join(LOG_FILE_NAME));

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            log_file_path(Some(dir.path())),
            dir.path().join("lazyfs-last-run.log")
        );
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");

        let path = init_tracing(Level::WARN, Some(&logs)).unwrap();

        assert!(path.exists());
        assert!(path.starts_with(&logs));
    }
}
