use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::env;
use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;

use log::{debug, info, warn};

/// Result of attempting to load a .env file.
#[derive(Debug)]
pub struct EnvLoadResult {
    /// Path of the loaded file, if any.
    pub path: Option<PathBuf>,
    /// Whether any .env file was loaded.
    pub loaded: bool,
}

/// Attempts to load .env from known locations.
pub fn try_load_dotenv() -> EnvLoadResult {
    // Try current directory first
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded .env from: {:?}", path);
        return EnvLoadResult {
            path: Some(path),
            loaded: true,
        };
    }

    // Try executable directory
    if let Ok(exe_path) = env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let env_path = exe_dir.join(".env");
        if env_path.exists() {
            match dotenvy::from_path(&env_path) {
                Ok(_) => {
                    info!("Loaded .env from: {:?}", env_path);
                    return EnvLoadResult {
                        path: Some(env_path),
                        loaded: true,
                    };
                }
                Err(e) => {
                    warn!("Failed to parse .env at {:?}: {}", env_path, e);
                }
            }
        }
    }

    debug!("No .env file found - using process environment only");
    EnvLoadResult {
        path: None,
        loaded: false,
    }
}

/// Variable lookup abstracted so tests can supply a fixed table.
pub(crate) struct EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub(crate) fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Non-empty value of `key`.
    pub(crate) fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    /// Only the literal `true` enables a flag.
    pub(crate) fn flag(&self, key: &str) -> Option<bool> {
        self.string(key).map(|v| v.trim() == "true")
    }

    #[track_caller]
    pub(crate) fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.string(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::EnvError {
                location: ErrorLocation::from(Location::caller()),
                key: key.to_string(),
                reason: format!("{raw:?}: {e}"),
            })
    }
}

pub(crate) fn process_env() -> EnvSource<impl Fn(&str) -> Option<String>> {
    EnvSource::new(|key: &str| env::var(key).ok())
}
