// Unit tests for error module
// Tests conversion from core errors and location tracking

use crate::error::GatewayError;

use gateway_core::error::{ConfigError, CoreError, InstanceError};

use common::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies core errors keep their message when converted.
///
/// **WHY THIS MATTERS**: `main` returns `GatewayError`, so this text is what an
/// operator sees when startup fails.
///
/// **BUG THIS CATCHES**: Would catch a conversion that drops the source message.
#[test]
fn given_config_error_when_converted_then_core_variant_keeps_message() {
    // GIVEN: A config validation failure
    let source = ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: String::from("qr_limit must be at least 1"),
    };

    // WHEN: Converting into GatewayError
    let err = GatewayError::from(source);

    // THEN: It is the Core variant carrying the original text
    match &err {
        GatewayError::Core { message, .. } => {
            assert!(message.contains("qr_limit must be at least 1"), "{message}")
        }
        other => panic!("Expected Core variant, got {other:?}"),
    }
    assert!(err.to_string().starts_with("Core Error: "));
}

#[test]
fn given_aggregated_core_error_when_converted_then_core_variant() {
    let source = CoreError::from(InstanceError::not_found("Instance"));

    let err = GatewayError::from(source);

    assert!(matches!(err, GatewayError::Core { .. }));
}

/// **VALUE**: Verifies errors record where they were raised.
///
/// **BUG THIS CATCHES**: Would catch if `#[track_caller]` is removed, which makes
/// every location point at the helper instead of the caller.
#[test]
fn given_gateway_error_when_displayed_then_includes_caller_location() {
    let err = GatewayError::gateway("signal handler failed");

    let text = err.to_string();

    assert!(text.starts_with("Gateway Error: signal handler failed"));
    assert!(
        text.contains("tests/error.rs") || text.contains("tests\\error.rs"),
        "Location should name this file: {text}"
    );
}
