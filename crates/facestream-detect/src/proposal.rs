//! Stage 1: dense proposals over the image pyramid.

use image::RgbImage;
use ndarray::s;
use tracing::trace;

use crate::geometry::{
    regress_proposal, square, suppress, BoundingBox, Candidate, NmsMethod, Regression, StageBoxes,
};
use crate::network::{expect_shape, meets_threshold, CascadeNetwork, ProposalMaps, ScoringError, Stage};
use crate::preprocess::scaled_tensor;
use crate::pyramid::CELL_SIZE;

/// Pixel step between neighbouring proposal map cells.
pub const STRIDE: f64 = 2.0;
/// Union-overlap threshold within one pyramid level.
pub const SCALE_NMS_THRESHOLD: f32 = 0.5;
/// Union-overlap threshold across all levels.
pub const MERGED_NMS_THRESHOLD: f32 = 0.7;

/// Map every cell scoring at least `threshold` back to an image-space box.
///
/// Cell `(row, col)` covers the scaled-image window starting at
/// `(STRIDE * row, STRIDE * col)` with side `CELL_SIZE`.
pub fn generate_boxes(
    maps: &ProposalMaps,
    scale: f64,
    threshold: f32,
) -> Result<Vec<Candidate>, ScoringError> {
    let (rows, cols) = maps.scores.dim();
    expect_shape(
        Stage::Proposal,
        "regression map",
        maps.regression.shape(),
        &[rows, cols, 4],
    )?;

    let mut out = Vec::new();
    for ((row, col), &score) in maps.scores.indexed_iter() {
        if !meets_threshold(score, threshold) {
            continue;
        }
        let edge = |cell: usize, offset: f64| ((STRIDE * cell as f64 + offset) / scale).trunc() as f32;
        let reg = maps.regression.slice(s![row, col, ..]);
        out.push(Candidate {
            bbox: BoundingBox::new(
                edge(col, 1.0),
                edge(row, 1.0),
                edge(col, CELL_SIZE),
                edge(row, CELL_SIZE),
                score,
            ),
            delta: Regression::new(reg[0], reg[1], reg[2], reg[3]),
        });
    }
    Ok(out)
}

/// Run the proposal network at every scale and merge the survivors into
/// square, integral boxes with their crop geometry.
pub fn run(
    network: &dyn CascadeNetwork,
    image: &RgbImage,
    scales: &[f64],
    threshold: f32,
) -> Result<StageBoxes, ScoringError> {
    let mut merged = Vec::new();
    for &scale in scales {
        let tensor = scaled_tensor(image, scale);
        let maps = network.propose(tensor.view())?;
        let candidates = generate_boxes(&maps, scale, threshold)?;
        let kept = suppress(candidates, SCALE_NMS_THRESHOLD, NmsMethod::Union);
        trace!(scale, kept = kept.len(), "proposal level");
        merged.extend(kept);
    }

    let boxes = suppress(merged, MERGED_NMS_THRESHOLD, NmsMethod::Union)
        .iter()
        .map(|c| square(&regress_proposal(&c.bbox, &c.delta)).truncated())
        .collect();
    Ok(StageBoxes::from_boxes(boxes, image.width(), image.height()))
}
