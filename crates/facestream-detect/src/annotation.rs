//! Integer-pixel face annotations handed to callers and drawn on frames.

use serde::{Deserialize, Serialize};

use crate::output::Detection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandmarkType {
    LeftEye,
    RightEye,
    Nose,
    MouthLeft,
    MouthRight,
}

impl LandmarkType {
    /// Order in which the output network emits landmarks.
    pub const ALL: [LandmarkType; 5] = [
        LandmarkType::LeftEye,
        LandmarkType::RightEye,
        LandmarkType::Nose,
        LandmarkType::MouthLeft,
        LandmarkType::MouthRight,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    #[serde(rename = "type")]
    pub kind: LandmarkType,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnnotation {
    pub bounding_box: FaceBox,
    pub confidence: f32,
    pub landmarks: [Landmark; 5],
}

impl From<&Detection> for FaceAnnotation {
    fn from(d: &Detection) -> Self {
        let x1 = d.bbox.x1 as i32;
        let y1 = d.bbox.y1 as i32;
        Self {
            bounding_box: FaceBox {
                x: x1,
                y: y1,
                w: d.bbox.x2 as i32 - x1,
                h: d.bbox.y2 as i32 - y1,
            },
            confidence: d.bbox.score,
            landmarks: std::array::from_fn(|i| Landmark {
                kind: LandmarkType::ALL[i],
                position: Position {
                    x: d.landmarks[i].x as i32,
                    y: d.landmarks[i].y as i32,
                },
            }),
        }
    }
}

/// Convert cascade detections into annotations, preserving order.
pub fn assemble(detections: &[Detection]) -> Vec<FaceAnnotation> {
    detections.iter().map(FaceAnnotation::from).collect()
}

/// Per-frame summary, logged by the server and printed by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub faces: Vec<FaceAnnotation>,
    pub total_faces: usize,
}

impl DetectionResult {
    pub fn new(faces: Vec<FaceAnnotation>) -> Self {
        let total_faces = faces.len();
        Self { faces, total_faces }
    }
}
