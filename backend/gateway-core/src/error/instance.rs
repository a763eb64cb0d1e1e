//! Error types surfaced by instance and registry operations.
//!
//! The variants follow the taxonomy the REST collaborator maps onto status
//! codes: missing things are `NotFound`, refused operations are
//! `PermissionDenied`, operations that need a logged-in session are
//! `Unauthenticated`. Protocol failures on strict paths pass through as
//! `Protocol`.

use crate::error::protocol::ProtocolError;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum InstanceError {
    #[error("Not Found: {what} {location}")]
    NotFound {
        what: String,
        location: ErrorLocation,
    },

    #[error("Permission Denied: {message} {location}")]
    PermissionDenied {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unauthenticated: instance not logged in {location}")]
    Unauthenticated { location: ErrorLocation },

    #[error("Protocol Error: {source}")]
    Protocol {
        #[source]
        source: ProtocolError,
    },
}

impl InstanceError {
    #[track_caller]
    pub fn not_found(what: impl Into<String>) -> Self {
        InstanceError::NotFound {
            what: what.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        InstanceError::PermissionDenied {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn unauthenticated() -> Self {
        InstanceError::Unauthenticated {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Stable category string for the HTTP boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            InstanceError::NotFound { .. } => "not_found",
            InstanceError::PermissionDenied { .. } => "permission_denied",
            InstanceError::Unauthenticated { .. } => "unauthenticated",
            InstanceError::Protocol { .. } => "protocol",
        }
    }
}

impl From<ProtocolError> for InstanceError {
    fn from(source: ProtocolError) -> Self {
        InstanceError::Protocol { source }
    }
}
