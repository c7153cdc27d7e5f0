//! Overlay encoding for transport.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageError, ImageFormat, RgbImage};
use std::io::Cursor;

/// Encodes an image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encodes an image as base64 PNG.
pub fn to_base64_png(image: &RgbImage) -> Result<String, ImageError> {
    Ok(STANDARD.encode(encode_png(image)?))
}

/// Encodes an image as a `data:image/png;base64,...` URL.
pub fn to_data_url(image: &RgbImage) -> Result<String, ImageError> {
    Ok(format!("data:image/png;base64,{}", to_base64_png(image)?))
}
