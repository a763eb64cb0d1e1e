use gateway::bootstrap;
use gateway::error::GatewayError;
use gateway::logger::{initialize as LoggerInitialize, parse_level};

use gateway_core::config::GatewayConfig;

use std::fs::create_dir_all;
use std::path::PathBuf;

use log::info;

/// Subdirectory of the data dir used for logs when none is configured.
const DEFAULT_LOG_SUBDIR: &str = "logs";

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // Optional TOML config path as the only argument
    let config_file = std::env::args_os().nth(1).map(PathBuf::from);
    let config = GatewayConfig::load(config_file.as_deref())?;

    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| config.data_dir.join(DEFAULT_LOG_SUBDIR));
    create_dir_all(&log_dir).map_err(|e| {
        GatewayError::gateway(format!(
            "Failed to create log directory {}: {e}",
            log_dir.display()
        ))
    })?;
    LoggerInitialize(&log_dir, parse_level(config.log_level.as_deref())?)?;

    info!("Logging to {}", log_dir.display());
    bootstrap::run(config).await
}
