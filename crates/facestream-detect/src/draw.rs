use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::annotation::FaceAnnotation;

const MARK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LANDMARK_RADIUS: i32 = 2;

/// Outline every face and dot its landmarks in place.
pub fn draw_annotations(image: &mut RgbImage, faces: &[FaceAnnotation]) {
    for face in faces {
        let b = face.bounding_box;
        // Corners are inclusive, so the outline spans w + 1 pixels.
        let rect = Rect::at(b.x, b.y).of_size((b.w + 1).max(1) as u32, (b.h + 1).max(1) as u32);
        draw_hollow_rect_mut(image, rect, MARK_COLOR);

        for landmark in &face.landmarks {
            let p = landmark.position;
            draw_filled_circle_mut(image, (p.x, p.y), LANDMARK_RADIUS, MARK_COLOR);
        }
    }
}
