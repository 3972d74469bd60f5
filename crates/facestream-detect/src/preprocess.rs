//! Pixel normalization, pyramid resizing and crop batching.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{s, Array3, Array4};

use crate::geometry::CropGeometry;
use crate::pyramid::scaled_dims;

pub const PIXEL_MEAN: f32 = 127.5;
pub const PIXEL_SCALE: f32 = 0.0078125;

const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Map a channel value into roughly `[-1, 1]`.
#[inline]
pub fn normalize(value: u8) -> f32 {
    (f32::from(value) - PIXEL_MEAN) * PIXEL_SCALE
}

/// Normalized `(height, width, 3)` tensor of `image`.
pub fn image_tensor(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        normalize(image.get_pixel(x as u32, y as u32)[c])
    })
}

/// The image resized by `scale` (dimensions rounded up), as a tensor.
pub fn scaled_tensor(image: &RgbImage, scale: f64) -> Array3<f32> {
    let (h, w) = scaled_dims(image.height(), image.width(), scale);
    let resized = imageops::resize(image, w, h, RESIZE_FILTER);
    image_tensor(&resized)
}

/// Cut every crop out of `image` into a zero-padded canvas, resize it to
/// `size × size` and stack the results into `(n, size, size, 3)`.
///
/// Every crop must be valid.
pub fn crop_batch(image: &RgbImage, crops: &[CropGeometry], size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut batch = Array4::<f32>::zeros((crops.len(), side, side, 3));

    for (n, crop) in crops.iter().enumerate() {
        let canvas = padded_canvas(image, crop);
        let resized = imageops::resize(&canvas, size, size, RESIZE_FILTER);
        batch.slice_mut(s![n, .., .., ..]).assign(&image_tensor(&resized));
    }
    batch
}

fn padded_canvas(image: &RgbImage, crop: &CropGeometry) -> RgbImage {
    let mut canvas = RgbImage::new(crop.tmp_w.max(1) as u32, crop.tmp_h.max(1) as u32);
    for dy in 0..crop.copy_height() {
        for dx in 0..crop.copy_width() {
            let px = *image.get_pixel(crop.src_x1 + dx, crop.src_y1 + dy);
            canvas.put_pixel(crop.dst_x1 + dx, crop.dst_y1 + dy, px);
        }
    }
    canvas
}
