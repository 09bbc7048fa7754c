//! Image encoding: `DynamicImage` → PNG bytes, and PNG → base64 `ImageData`.
//!
//! PNG is used both for the request body and for overlay artifacts. It is
//! lossless: JPEG artefacts around glyph edges make vision models misplace
//! block boundaries, which shows up directly as overlap findings.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Serialise an image as PNG.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a rasterised page as a base64 PNG ready for the vision request.
///
/// `detail: "high"` keeps fine print and small table cells legible to
/// tiling models; bounding boxes drawn around unreadable text are useless.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let png = png_bytes(img)?;
    let b64 = STANDARD.encode(&png);
    debug!(
        "Encoded {}x{} page → {} bytes PNG, {} bytes base64",
        img.width(),
        img.height(),
        png.len(),
        b64.len()
    );
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
