//! Logging infrastructure for meter.
//!
//! Structured logging using the `tracing` ecosystem:
//!
//! - JSON lines written to `~/.meter/logs/meter.log` (rotated daily)
//! - Compact human-readable output on stderr
//! - `RUST_LOG` overrides the default `meter=info` filter
//!
//! ## Example
//!
//! ```no_run
//! use meter_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("meter started");
//! tracing::debug!(execution_id = "exec-1", "appending record");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{MeterError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the meter logging system.
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.meter/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
///
/// # Returns
///
/// A [`LogGuard`] that must be held for the application lifetime.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| MeterError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "meter.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meter={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| MeterError::internal(format!("logging already initialized: {e}")))?;

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize console-only logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Base directory for meter state: `~/.meter/`
pub fn meter_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| MeterError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".meter"))
}

/// Get the default log directory path: `~/.meter/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(meter_home()?.join("logs"))
}

/// Log a sandboxed tool invocation.
///
/// ```ignore
/// log_tool_call!("read_file", success = true, duration_ms = 12);
/// ```
#[macro_export]
macro_rules! log_tool_call {
    ($tool_name:expr, $($field:tt)*) => {
        tracing::info!(
            target: "meter::tool",
            tool = $tool_name,
            $($field)*,
            "tool call"
        )
    };
}

/// Log a usage record landing in the store.
///
/// ```ignore
/// log_usage_event!(execution_id = "exec-1", kind = "token", day = "2025-01-01");
/// ```
#[macro_export]
macro_rules! log_usage_event {
    ($($field:tt)*) => {
        tracing::debug!(
            target: "meter::usage",
            $($field)*,
            "usage event"
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_log_dir() {
        // SAFETY: serialized with every other test that touches HOME
        unsafe { std::env::set_var("HOME", "/tmp/test-home") };
        let dir = default_log_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/test-home/.meter/logs"));
    }

    #[test]
    #[serial]
    fn test_meter_home() {
        // SAFETY: serialized with every other test that touches HOME
        unsafe { std::env::set_var("HOME", "/tmp/test-home") };
        assert_eq!(meter_home().unwrap(), PathBuf::from("/tmp/test-home/.meter"));
    }

    #[test]
    fn test_init_test_logging() {
        init_test_logging();
        init_test_logging();
    }
}
