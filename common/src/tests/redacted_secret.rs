use crate::RedactedSecret;

/// **VALUE**: Verifies the push-broadcast secret never leaks through Debug or Display.
///
/// **WHY THIS MATTERS**: GatewayConfig is logged at startup with `{:?}`. A leaking Debug impl
/// would write the signing secret into the log file.
///
/// **BUG THIS CATCHES**: Would catch a derived Debug replacing the manual redacting impl.
#[test]
fn given_secret_when_formatted_then_value_is_redacted() {
    // GIVEN: A secret
    let secret = RedactedSecret::new("super-secret-value");

    // WHEN: Formatting both ways
    let debug = format!("{:?}", secret);
    let display = format!("{}", secret);

    // THEN: Neither contains the value, but expose() does
    assert!(!debug.contains("super-secret-value"));
    assert!(!display.contains("super-secret-value"));
    assert_eq!(secret.expose(), "super-secret-value");
    assert_eq!(secret.len(), 18);
}

/// **VALUE**: Verifies that serializing a secret fails instead of writing it out.
///
/// **WHY THIS MATTERS**: Config structs derive Serialize; a secret inside must not end up
/// in a JSON dump.
///
/// **BUG THIS CATCHES**: Would catch if Serialize were derived for RedactedSecret.
#[test]
fn given_secret_when_serialized_then_returns_error() {
    // GIVEN: A secret
    let secret = RedactedSecret::new("abc");

    // WHEN: Serializing
    let result = serde_json::to_string(&secret);

    // THEN: Refused
    assert!(result.is_err());
}

/// **VALUE**: Verifies a secret can be read from a config file.
///
/// **WHY THIS MATTERS**: The push-broadcast secret may come from the TOML config as well as
/// the environment.
///
/// **BUG THIS CATCHES**: Would catch a Deserialize impl that drops or mangles the value.
#[test]
fn given_json_string_when_deserialized_then_secret_holds_value() {
    // GIVEN: A JSON string
    let raw = "\"pusher-secret\"";

    // WHEN: Deserializing
    let secret: RedactedSecret = serde_json::from_str(raw).expect("valid secret");

    // THEN: The value is available through expose()
    assert_eq!(secret.expose(), "pusher-secret");
}
