use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use crate::DetectError;

/// Decode any supported container (PNG, JPEG, ...) into 8-bit RGB.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, DetectError> {
    let image = image::load_from_memory(bytes).map_err(DetectError::Decode)?;
    Ok(image.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, DetectError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(DetectError::Encode)?;
    Ok(out.into_inner())
}
