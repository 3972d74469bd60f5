//! Image pyramid scales for the proposal stage.

/// Side of the square window the proposal network scores per map cell.
pub const CELL_SIZE: f64 = 12.0;

/// Scales at which the proposal network must see the image so that faces
/// of at least `min_face_size` pixels fill its 12-pixel window.
///
/// The first scale is `12 / min_face_size`; each following scale is the
/// previous one times `factor`, for as long as the shorter image side,
/// scaled, stays at or above 12 pixels.
pub fn scales(height: u32, width: u32, min_face_size: u32, factor: f64) -> Vec<f64> {
    if min_face_size == 0 {
        return Vec::new();
    }

    let base = CELL_SIZE / f64::from(min_face_size);
    let mut min_layer = f64::from(height.min(width)) * base;

    if !(factor > 0.0 && factor < 1.0) {
        return if min_layer >= CELL_SIZE { vec![base] } else { Vec::new() };
    }

    let mut scales = Vec::new();
    let mut scale = base;
    while min_layer >= CELL_SIZE {
        scales.push(scale);
        scale *= factor;
        min_layer *= factor;
    }
    scales
}

/// Pixel dimensions `(height, width)` of the image resized by `scale`.
pub fn scaled_dims(height: u32, width: u32, scale: f64) -> (u32, u32) {
    let h = (f64::from(height) * scale).ceil() as u32;
    let w = (f64::from(width) * scale).ceil() as u32;
    (h.max(1), w.max(1))
}
