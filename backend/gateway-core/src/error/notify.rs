use common::{ErrorLocation, HttpStatusCode};

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum NotifyError {
    #[error("HTTP Error: {message} {location}")]
    Http {
        message: String,
        location: ErrorLocation,
    },

    #[error("Endpoint Rejected: HTTP {status_code} {location}")]
    Rejected {
        status_code: HttpStatusCode,
        location: ErrorLocation,
    },

    #[error("URL Error: {message} {location}")]
    Url {
        message: String,
        location: ErrorLocation,
    },

    #[error("Signature Error: {message} {location}")]
    Signature {
        message: String,
        location: ErrorLocation,
    },

    #[error("QR Render Error: {message} {location}")]
    Render {
        message: String,
        location: ErrorLocation,
    },
}

impl NotifyError {
    #[track_caller]
    pub fn rejected(status: u16) -> Self {
        NotifyError::Rejected {
            status_code: HttpStatusCode(status),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn render(message: impl Into<String>) -> Self {
        NotifyError::Render {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Category for log lines.
    pub fn category(&self) -> &'static str {
        match self {
            NotifyError::Http { .. } => "http",
            NotifyError::Rejected { status_code, .. } if status_code.is_client_error() => {
                "client_error"
            }
            NotifyError::Rejected { status_code, .. } if status_code.is_server_error() => {
                "server_error"
            }
            NotifyError::Rejected { .. } => "rejected",
            NotifyError::Url { .. } => "url",
            NotifyError::Signature { .. } => "signature",
            NotifyError::Render { .. } => "render",
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    #[track_caller]
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return NotifyError::Rejected {
                status_code: HttpStatusCode(status.as_u16()),
                location: ErrorLocation::from(Location::caller()),
            };
        }
        NotifyError::Http {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<url::ParseError> for NotifyError {
    #[track_caller]
    fn from(error: url::ParseError) -> Self {
        NotifyError::Url {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
