//! Process logging for the gateway.
//!
//! Dual output (stdout with colors + file) with thread-safe initialization.

use crate::error::GatewayError;

use std::io::stdout;
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, info, warn};

/// Thread-safe initialization guard.
static INIT_LOGGER_ONCE: Once = Once::new();

/// Tracks if logger initialization was already attempted.
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

/// Log file name.
pub const LOG_FILE_NAME: &str = "gateway.log";

const LOGGER_INITIALIZED_MESSAGE_PREFIX: &str = "Logger initialized with level: ";

const LOGGER_ALREADY_INITIALIZED_MESSAGE: &str = "Logger already initialized";

/// Default log level for debug builds.
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// Default log level for release builds.
#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Parses a configured level name (`info`, `DEBUG`, `off`, ...). `None`
/// falls back to [`DEFAULT_LOG_LEVEL`].
#[track_caller]
pub fn parse_level(level: Option<&str>) -> Result<LevelFilter, GatewayError> {
    match level {
        None => Ok(DEFAULT_LOG_LEVEL),
        Some(name) => LevelFilter::from_str(name.trim())
            .map_err(|_| GatewayError::gateway(format!("Unknown log level: {name}"))),
    }
}

/// Initialize the logger with dual output (stdout + file).
///
/// The log file is opened on every call, so an unusable `log_dir` is always
/// reported. Once a logger is installed, later calls log a warning and
/// return Ok.
///
/// # Errors
///
/// Returns an error if the log file cannot be created or the dispatch cannot
/// be installed.
#[track_caller]
pub fn initialize(log_dir: &Path, level: LevelFilter) -> Result<(), GatewayError> {
    let log_file = fern::log_file(log_dir.join(LOG_FILE_NAME))
        .map_err(|e| GatewayError::gateway(format!("Failed to create log file: {e}")))?;

    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("{LOGGER_ALREADY_INITIALIZED_MESSAGE}");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_file, level);
        if result.is_ok() {
            info!("{LOGGER_INITIALIZED_MESSAGE_PREFIX}{level:?}");
        }
    });

    result
}

#[track_caller]
fn initialize_internal(log_file: std::fs::File, level: LevelFilter) -> Result<(), GatewayError> {
    let color_configuration = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let dependency_level = level.min(LevelFilter::Info);
    let base_dispatch = Dispatch::new()
        .level(level)
        .level_for("tungstenite", dependency_level)
        .level_for("tokio_tungstenite", dependency_level)
        .level_for("hyper_util", dependency_level)
        .level_for("reqwest", dependency_level);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = color_configuration.color(record.level()),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(stdout());

    // Plain text, no colors
    let file_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = record.level(),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0)
            ))
        })
        .chain(log_file);

    base_dispatch
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()
        .map_err(|e| GatewayError::gateway(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}
