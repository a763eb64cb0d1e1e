//! Shared leaf types for the messaging gateway.
//!
//! This crate holds the small pieces every other crate needs and that carry
//! no gateway behavior of their own.
//!
//! ## Architecture
//!
//! - **common** (this crate): error locations, status codes, secrets
//! - **gateway-core**: instance orchestration (registry, lifecycle, caches)
//! - **gateway**: process bootstrap wiring everything together

pub mod error;
pub mod http_status;
pub mod redacted_secret;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use http_status::HttpStatusCode;
pub use redacted_secret::RedactedSecret;

#[cfg(test)]
mod tests;
