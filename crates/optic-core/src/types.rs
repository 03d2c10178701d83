use serde::{Deserialize, Serialize};

/// Name reported when no gallery entry matches a probe face.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Axis-aligned box in source image pixels, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

/// Face embedding vector produced by the server.
///
/// Opaque to the client: two embeddings are only ever compared through the
/// remote compare endpoint. Serialized as a plain JSON array and stored at
/// the precision the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f64>,
}

impl Embedding {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Copy of this embedding with every value cut to at most `places`
    /// decimals.
    ///
    /// Digits past `places` are dropped from the shortest decimal form of
    /// each value, so 0.456 becomes 0.45 and -0.789 becomes -0.78.
    pub fn truncated(&self, places: usize) -> Embedding {
        Embedding {
            values: self.values.iter().map(|&v| truncate_decimals(v, places)).collect(),
        }
    }
}

fn truncate_decimals(value: f64, places: usize) -> f64 {
    // Display gives the shortest round-trip form, never an exponent.
    let text = value.to_string();
    match text.split_once('.') {
        Some((whole, frac)) if frac.len() > places => {
            let cut = if places == 0 {
                whole.to_string()
            } else {
                format!("{whole}.{}", &frac[..places])
            };
            cut.parse().unwrap_or(value)
        }
        _ => value,
    }
}

/// A face found by the embedding endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Position in the server's `faces` array.
    pub index: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// One label from the classification endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub index: usize,
    pub confidence: f32,
    pub label: String,
}

/// An object found by the detection endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub index: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// A single skeleton from the pose endpoint.
///
/// `points` keeps every keypoint the server sent, in keypoint-id order;
/// skeleton edges are looked up by id, so low-confidence points are not
/// dropped here.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub index: usize,
    pub points: Vec<Keypoint>,
}

impl Pose {
    /// Keypoints at or above `threshold`, paired with their keypoint id.
    pub fn confident_points(&self, threshold: f32) -> impl Iterator<Item = (usize, &Keypoint)> {
        self.points
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.confidence >= threshold)
    }
}

/// A stored, named face embedding. One element of the gallery file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub name: String,
    pub embeddings: Embedding,
}

/// Result of resolving a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Score of the accepted entry, or the best score seen when unmatched.
    pub score: f32,
    /// Matched name, or [`UNKNOWN_IDENTITY`].
    pub name: String,
}

impl MatchResult {
    pub fn unknown(score: f32) -> Self {
        Self {
            matched: false,
            score,
            name: UNKNOWN_IDENTITY.to_string(),
        }
    }
}

/// Per-endpoint confidence cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub face: f32,
    pub class: f32,
    pub object: f32,
    /// Applied per keypoint, not per skeleton.
    pub pose_keypoint: f32,
    /// Compare score a gallery entry must exceed to count as a match.
    pub face_match: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            face: 0.5,
            class: 0.5,
            object: 0.5,
            pose_keypoint: 0.2,
            face_match: 0.8,
        }
    }
}
