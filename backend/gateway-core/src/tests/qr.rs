// Unit tests for QR rendering

use crate::qr::{PngDataUrlRenderer, QrRenderer};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// **VALUE**: Verifies the renderer produces a PNG data URL a browser can display.
///
/// **BUG THIS CATCHES**: Would catch a missing prefix or a non-PNG payload, both of
/// which render as a broken image in the QR view.
#[test]
fn given_payload_when_rendered_then_returns_png_data_url() {
    // GIVEN: A typical pairing payload
    let renderer = PngDataUrlRenderer::default();

    // WHEN: Rendering it
    let url = renderer
        .render("2@abcDEF123,xyz456,789==")
        .expect("render should succeed");

    // THEN: A base64 PNG data URL
    let encoded = url
        .strip_prefix("data:image/png;base64,")
        .expect("data url prefix");
    let bytes = STANDARD.decode(encoded).expect("valid base64");
    assert_eq!(&bytes[..8], &PNG_SIGNATURE);
}

/// **VALUE**: Verifies module size and quiet zone drive the image dimensions.
#[test]
fn given_module_size_and_quiet_zone_when_rendered_then_dimensions_match() {
    // GIVEN: A short payload, which fits a version 1 (21x21 module) code
    let payload = "payload";

    // WHEN: Rendering with two geometries
    let bare = PngDataUrlRenderer::new(1, 0)
        .render_png(payload)
        .expect("render should succeed");
    let padded = PngDataUrlRenderer::new(8, 4)
        .render_png(payload)
        .expect("render should succeed");

    // THEN: (modules + 2 * quiet_zone) * module_size pixels per side
    let bare = image::load_from_memory(&bare).expect("valid png");
    let padded = image::load_from_memory(&padded).expect("valid png");
    assert_eq!((bare.width(), bare.height()), (21, 21));
    assert_eq!(padded.width(), (21 + 8) * 8);
}
