use gateway_core::error::{ConfigError, CoreError, NotifyError, ProtocolError};

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error;

/// Errors that stop the gateway process from starting or running.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Error from the gateway binary itself (logging, signals)
    #[error("Gateway Error: {message} {location}")]
    Gateway {
        message: String,
        location: ErrorLocation,
    },

    /// Error from gateway-core (config, bridge, notifications)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },
}

impl GatewayError {
    #[track_caller]
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

macro_rules! core_error_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for GatewayError {
                #[track_caller]
                fn from(error: $source) -> Self {
                    Self::Core {
                        message: error.to_string(),
                        location: ErrorLocation::from(Location::caller()),
                    }
                }
            }
        )+
    };
}

core_error_from!(CoreError, ConfigError, NotifyError, ProtocolError);
