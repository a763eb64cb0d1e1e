use crate::{ErrorLocation, HttpStatusCode};
use std::panic::Location;

/// **VALUE**: Verifies that `ErrorLocation::from()` captures the calling file.
///
/// **WHY THIS MATTERS**: Every gateway error carries an ErrorLocation. If capture breaks,
/// no error message says where it came from.
///
/// **BUG THIS CATCHES**: Would catch if `Location::caller()` stops being propagated or the
/// file/column fields are dropped.
#[test]
fn given_location_caller_when_error_location_created_then_captures_file_and_column() {
    // GIVEN/WHEN: Creating ErrorLocation from caller
    let location = ErrorLocation::from(Location::caller());

    // THEN: Should capture file, line, and column
    assert!(location.file.contains("error_location.rs"));
    assert!(location.line > 0);
    assert!(location.column > 0);
}

/// **VALUE**: Verifies the bracketed `[file:line:column]` Display format.
///
/// **WHY THIS MATTERS**: Every `#[error(...)]` string ends with `{location}`; log readers
/// grep for this shape.
///
/// **BUG THIS CATCHES**: Would catch a Display change that drops brackets or separators.
#[test]
fn given_error_location_when_formatted_then_produces_bracketed_format() {
    // GIVEN: A fixed location
    let location = ErrorLocation {
        file: "src/instance/lifecycle.rs",
        line: 42,
        column: 7,
    };

    // WHEN: Formatting
    let formatted = location.to_string();

    // THEN: Bracketed triple
    assert_eq!(formatted, "[src/instance/lifecycle.rs:42:7]");
    assert_eq!(location.file_name(), "lifecycle.rs");
}

/// **VALUE**: Verifies status code classification used for disconnect reasons and webhook replies.
///
/// **WHY THIS MATTERS**: Webhook failures are logged by category; a wrong range check would
/// mislabel every failure.
///
/// **BUG THIS CATCHES**: Off-by-one range boundaries.
#[test]
fn given_status_codes_when_classified_then_ranges_are_exact() {
    assert!(HttpStatusCode(200).is_success());
    assert!(!HttpStatusCode(300).is_success());
    assert!(HttpStatusCode(401).is_client_error());
    assert!(!HttpStatusCode(500).is_client_error());
    assert!(HttpStatusCode(515).is_server_error());
    assert_eq!(HttpStatusCode::from(428).to_string(), "428");
}
