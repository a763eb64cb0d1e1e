use crate::error::notify::NotifyError;

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageBuffer, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Turns a QR challenge payload into something a browser can display.
pub trait QrRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<String, NotifyError>;
}

/// Renders PNG data URLs.
#[derive(Debug, Clone, Copy)]
pub struct PngDataUrlRenderer {
    module_size: u32,
    quiet_zone: u32,
}

impl Default for PngDataUrlRenderer {
    fn default() -> Self {
        Self {
            module_size: 4,
            quiet_zone: 4,
        }
    }
}

impl PngDataUrlRenderer {
    pub fn new(module_size: u32, quiet_zone: u32) -> Self {
        Self {
            module_size: module_size.max(1),
            quiet_zone,
        }
    }

    pub fn render_png(&self, payload: &str) -> Result<Vec<u8>, NotifyError> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
            .map_err(|e| NotifyError::render(format!("QR generation failed: {e}")))?;

        let module_size = self.module_size;
        let quiet_zone = self.quiet_zone;
        let modules = code.width() as u32;
        let img_size = (modules + quiet_zone * 2) * module_size;

        let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
            let (cx, cy) = (x / module_size, y / module_size);
            if cx < quiet_zone || cy < quiet_zone {
                return Luma([255u8]);
            }
            let (mx, my) = (cx - quiet_zone, cy - quiet_zone);
            if mx >= modules || my >= modules {
                return Luma([255u8]);
            }
            match code[(mx as usize, my as usize)] {
                Color::Dark => Luma([0u8]),
                Color::Light => Luma([255u8]),
            }
        });

        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| NotifyError::render(format!("PNG encoding failed: {e}")))?;

        Ok(buf.into_inner())
    }
}

impl QrRenderer for PngDataUrlRenderer {
    fn render(&self, payload: &str) -> Result<String, NotifyError> {
        let png = self.render_png(payload)?;
        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png)))
    }
}
