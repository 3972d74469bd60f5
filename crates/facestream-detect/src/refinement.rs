//! Stage 2: re-score proposals on 24×24 crops.

use image::RgbImage;

use crate::geometry::{regress, square, suppress, Candidate, NmsMethod, Regression, StageBoxes};
use crate::network::{expect_shape, meets_threshold, CascadeNetwork, ScoringError, Stage};
use crate::preprocess::crop_batch;

pub const INPUT_SIZE: u32 = 24;
pub const NMS_THRESHOLD: f32 = 0.7;

pub fn run(
    network: &dyn CascadeNetwork,
    image: &RgbImage,
    proposals: StageBoxes,
    threshold: f32,
) -> Result<StageBoxes, ScoringError> {
    let proposals = proposals.retain_valid();
    if proposals.is_empty() {
        return Ok(proposals);
    }

    let n = proposals.len();
    let batch = crop_batch(image, &proposals.crops, INPUT_SIZE);
    let out = network.refine(batch.view())?;
    expect_shape(Stage::Refinement, "scores", out.scores.shape(), &[n])?;
    expect_shape(Stage::Refinement, "regression", out.regression.shape(), &[n, 4])?;

    let mut survivors = Vec::new();
    for (i, bbox) in proposals.boxes.iter().enumerate() {
        let score = out.scores[i];
        if !meets_threshold(score, threshold) {
            continue;
        }
        let reg = out.regression.row(i);
        survivors.push(Candidate {
            bbox: bbox.with_score(score),
            delta: Regression::new(reg[0], reg[1], reg[2], reg[3]),
        });
    }

    let boxes = suppress(survivors, NMS_THRESHOLD, NmsMethod::Union)
        .iter()
        .map(|c| square(&regress(&c.bbox, &c.delta)).truncated())
        .collect();
    Ok(StageBoxes::from_boxes(boxes, image.width(), image.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::network::{OutputScores, ProposalMaps, RefinementScores};
    use ndarray::{arr1, Array2, ArrayView3, ArrayView4};

    /// Returns fixed refinement scores with zero regression.
    struct FixedScores(Vec<f32>);

    impl CascadeNetwork for FixedScores {
        fn propose(&self, _: ArrayView3<'_, f32>) -> Result<ProposalMaps, ScoringError> {
            Err(ScoringError::backend(Stage::Proposal, "not scripted"))
        }

        fn refine(&self, crops: ArrayView4<'_, f32>) -> Result<RefinementScores, ScoringError> {
            assert_eq!(crops.shape()[1..], [24, 24, 3]);
            Ok(RefinementScores {
                scores: arr1(&self.0),
                regression: Array2::zeros((self.0.len(), 4)),
            })
        }

        fn output(&self, _: ArrayView4<'_, f32>) -> Result<OutputScores, ScoringError> {
            Err(ScoringError::backend(Stage::Output, "not scripted"))
        }
    }

    fn proposals() -> StageBoxes {
        StageBoxes::from_boxes(
            vec![
                BoundingBox::new(1.0, 1.0, 20.0, 20.0, 0.8),
                BoundingBox::new(31.0, 11.0, 50.0, 30.0, 0.8),
            ],
            64,
            48,
        )
    }

    #[test]
    fn survivors_take_the_refined_score() {
        let image = RgbImage::new(64, 48);
        let out = run(&FixedScores(vec![0.95, 0.2]), &image, proposals(), 0.7).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.boxes[0].score, 0.95);
        assert_eq!((out.boxes[0].x1, out.boxes[0].y1), (1.0, 1.0));
    }

    #[test]
    fn nan_score_is_rejected() {
        let image = RgbImage::new(64, 48);
        let out = run(&FixedScores(vec![f32::NAN, 0.9]), &image, proposals(), 0.7).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.boxes[0].score, 0.9);
        assert_eq!(out.boxes[0].x1, 31.0);
    }

    #[test]
    fn empty_proposals_skip_the_network() {
        let image = RgbImage::new(64, 48);
        let out = run(&FixedScores(vec![]), &image, StageBoxes::default(), 0.7).unwrap();
        assert!(out.is_empty());
    }
}
