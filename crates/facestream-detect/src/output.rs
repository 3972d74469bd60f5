//! Stage 3: final scores, box refinement and facial landmarks on 48×48 crops.

use image::RgbImage;

use crate::geometry::{nms, regress, BoundingBox, NmsMethod, Regression, StageBoxes};
use crate::network::{expect_shape, meets_threshold, CascadeNetwork, ScoringError, Stage};
use crate::preprocess::crop_batch;

pub const INPUT_SIZE: u32 = 48;
pub const NMS_THRESHOLD: f32 = 0.7;
pub const LANDMARK_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A confirmed face: final box plus five landmarks in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub landmarks: [Point; LANDMARK_COUNT],
}

pub fn run(
    network: &dyn CascadeNetwork,
    image: &RgbImage,
    refined: StageBoxes,
    threshold: f32,
) -> Result<Vec<Detection>, ScoringError> {
    let refined = refined.retain_valid();
    if refined.is_empty() {
        return Ok(Vec::new());
    }

    let n = refined.len();
    let batch = crop_batch(image, &refined.crops, INPUT_SIZE);
    let out = network.output(batch.view())?;
    expect_shape(Stage::Output, "scores", out.scores.shape(), &[n])?;
    expect_shape(Stage::Output, "regression", out.regression.shape(), &[n, 4])?;
    expect_shape(
        Stage::Output,
        "landmarks",
        out.landmarks.shape(),
        &[n, 2 * LANDMARK_COUNT],
    )?;

    let mut detections = Vec::new();
    for (i, b) in refined.boxes.iter().enumerate() {
        let score = out.scores[i];
        if !meets_threshold(score, threshold) {
            continue;
        }

        // Landmarks are placed relative to the box before regression.
        let w = b.x2 - b.x1 + 1.0;
        let h = b.y2 - b.y1 + 1.0;
        let lm = out.landmarks.row(i);
        let landmarks = std::array::from_fn(|j| Point {
            x: b.x1 + w * lm[j] - 1.0,
            y: b.y1 + h * lm[j + LANDMARK_COUNT] - 1.0,
        });

        let reg = out.regression.row(i);
        let delta = Regression::new(reg[0], reg[1], reg[2], reg[3]);
        detections.push(Detection {
            bbox: regress(&b.with_score(score), &delta),
            landmarks,
        });
    }

    let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
    Ok(nms(&boxes, NMS_THRESHOLD, NmsMethod::Min)
        .into_iter()
        .map(|i| detections[i].clone())
        .collect())
}
