//! Easy initialisation functionality to set an event logging system.
//!
//! ```rust,ignore
//! use petri::logging::init_logging;
//! use tracing::level_filters::LevelFilter;
//!
//! init_logging(LevelFilter::INFO, Some(Path::new("run.log")), LevelFilter::DEBUG)?;
//! tracing::info!("written to both stderr and the log file");
//! tracing::debug!("only written to the log file");
//! ```

use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::SecondsFormat;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;

use crate::cli::LogArgs;

/// Renders event timestamps in ISO-8601 format with millisecond precision,
/// in the local timezone.
struct Iso8601Millis;

impl FormatTime for Iso8601Millis {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
        )
    }
}

/// Initialises the logging system.
///
/// All messages of `log_level` and above go to standard error. If
/// `log_file` is provided, all messages of `log_file_level` and above are
/// also written there.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(
    log_level: LevelFilter,
    log_file: Option<&Path>,
    log_file_level: LevelFilter,
) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(Iso8601Millis)
        .with_filter(log_level);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file '{}'", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_timer(Iso8601Millis)
                    .with_filter(log_file_level),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialise logging: {e}"))
}

/// Initialises the logging system from a parsed [`LogArgs`] group.
pub fn init_logging_with_args(args: &LogArgs) -> Result<()> {
    init_logging(args.level(), args.log_file.as_deref(), args.log_file_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    // A global subscriber can only be installed once per process, so a
    // single test exercises the whole flow.
    #[test]
    fn test_init_logging_with_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("test.log");
        init_logging(LevelFilter::WARN, Some(&log_path), LevelFilter::DEBUG).unwrap();
        tracing::warn!("warned");
        tracing::debug!("debugged");
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("warned"));
        assert!(content.contains("debugged"), "file sink should get debug events");

        // Second initialisation must fail, not silently reconfigure
        assert!(init_logging(LevelFilter::WARN, None, LevelFilter::DEBUG).is_err());
    }
}
