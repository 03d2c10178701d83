//! Decoding of inference server responses.
//!
//! Every endpoint answers with either `{"error": {"code", "message"}}` or
//! `{"result": {...}}`. The error object is checked first; the result is
//! then deserialized into the endpoint's wire shape, checked for an empty
//! detection array, and filtered by confidence.

use crate::types::{BoundingBox, Classification, DetectedObject, Embedding, Face, Keypoint, Pose};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Which result array a response was expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Faces,
    Classes,
    Objects,
    Poses,
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionKind::Faces => "faces",
            DetectionKind::Classes => "classes",
            DetectionKind::Objects => "objects",
            DetectionKind::Poses => "poses",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to parse JSON output from API server: {0}")]
    Parse(String),
    #[error("server returned error (code {code}): {message}")]
    Server { code: i64, message: String },
    #[error("no {0} detected in input image")]
    NoDetection(DetectionKind),
}

#[derive(Debug, Deserialize)]
struct ServerError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireBoundingBox {
    top: f32,
    left: f32,
    width: f32,
    height: f32,
}

impl From<WireBoundingBox> for BoundingBox {
    fn from(b: WireBoundingBox) -> Self {
        BoundingBox {
            top: b.top,
            left: b.left,
            width: b.width,
            height: b.height,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FacesResult {
    faces: Vec<WireFace>,
}

#[derive(Debug, Deserialize)]
struct WireFace {
    confidence: f32,
    #[serde(rename = "boundingBox")]
    bounding_box: WireBoundingBox,
    embeddings: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ClassesResult {
    classes: Vec<WireClass>,
}

#[derive(Debug, Deserialize)]
struct WireClass {
    confidence: f32,
    class: String,
}

#[derive(Debug, Deserialize)]
struct ObjectsResult {
    objects: Vec<WireObject>,
}

#[derive(Debug, Deserialize)]
struct WireObject {
    confidence: f32,
    #[serde(rename = "boundingBox")]
    bounding_box: WireBoundingBox,
    object: String,
}

#[derive(Debug, Deserialize)]
struct PosesResult {
    poses: Vec<WirePose>,
}

#[derive(Debug, Deserialize)]
struct WirePose {
    points: Vec<Keypoint>,
}

#[derive(Debug, Deserialize)]
struct ComparisonResult {
    confidence: f32,
}

/// Parse a raw payload and return its `result` object as `R`.
///
/// Fails with [`DecodeError::Server`] if the payload carries an `error`
/// key, regardless of whether a `result` is also present.
pub fn decode_result<R: DeserializeOwned>(raw: &str) -> Result<R, DecodeError> {
    let mut doc: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Parse(format!("{e}: {raw}")))?;

    if let Some(err) = doc.get("error") {
        let err: ServerError = serde_json::from_value(err.clone())
            .map_err(|e| DecodeError::Parse(format!("malformed error object: {e}")))?;
        return Err(DecodeError::Server {
            code: err.code,
            message: err.message,
        });
    }

    let result = doc
        .get_mut("result")
        .map(serde_json::Value::take)
        .ok_or_else(|| DecodeError::Parse("response has neither `result` nor `error`".into()))?;

    serde_json::from_value(result).map_err(|e| DecodeError::Parse(e.to_string()))
}

/// Decode a face-embedding response, keeping faces with `confidence >= threshold`.
pub fn decode_faces(raw: &str, threshold: f32) -> Result<Vec<Face>, DecodeError> {
    let result: FacesResult = decode_result(raw)?;
    if result.faces.is_empty() {
        return Err(DecodeError::NoDetection(DetectionKind::Faces));
    }
    let faces = result
        .faces
        .into_iter()
        .enumerate()
        .filter(|(_, f)| f.confidence >= threshold)
        .map(|(index, f)| Face {
            index,
            confidence: f.confidence,
            bbox: f.bounding_box.into(),
            embedding: Embedding::new(f.embeddings),
        })
        .collect();
    Ok(faces)
}

/// Decode a classification response, keeping classes with `confidence >= threshold`.
pub fn decode_classes(raw: &str, threshold: f32) -> Result<Vec<Classification>, DecodeError> {
    let result: ClassesResult = decode_result(raw)?;
    if result.classes.is_empty() {
        return Err(DecodeError::NoDetection(DetectionKind::Classes));
    }
    Ok(result
        .classes
        .into_iter()
        .enumerate()
        .filter(|(_, c)| c.confidence >= threshold)
        .map(|(index, c)| Classification {
            index,
            confidence: c.confidence,
            label: c.class,
        })
        .collect())
}

/// Decode an object-detection response, keeping objects with `confidence >= threshold`.
pub fn decode_objects(raw: &str, threshold: f32) -> Result<Vec<DetectedObject>, DecodeError> {
    let result: ObjectsResult = decode_result(raw)?;
    if result.objects.is_empty() {
        return Err(DecodeError::NoDetection(DetectionKind::Objects));
    }
    Ok(result
        .objects
        .into_iter()
        .enumerate()
        .filter(|(_, o)| o.confidence >= threshold)
        .map(|(index, o)| DetectedObject {
            index,
            confidence: o.confidence,
            bbox: o.bounding_box.into(),
            label: o.object,
        })
        .collect())
}

/// Decode a pose response.
///
/// The threshold applies per keypoint: a pose is kept when at least one of
/// its keypoints reaches it, and then all its keypoints are kept.
pub fn decode_poses(raw: &str, keypoint_threshold: f32) -> Result<Vec<Pose>, DecodeError> {
    let result: PosesResult = decode_result(raw)?;
    if result.poses.is_empty() {
        return Err(DecodeError::NoDetection(DetectionKind::Poses));
    }
    Ok(result
        .poses
        .into_iter()
        .enumerate()
        .filter(|(_, p)| p.points.iter().any(|k| k.confidence >= keypoint_threshold))
        .map(|(index, p)| Pose {
            index,
            points: p.points,
        })
        .collect())
}

/// Decode a face-compare response into the raw server confidence.
pub fn decode_comparison(raw: &str) -> Result<f32, DecodeError> {
    let result: ComparisonResult = decode_result(raw)?;
    Ok(result.confidence)
}
