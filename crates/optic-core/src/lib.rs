//! optic-core — Response decoding, face gallery and identity resolution.
//!
//! Detection and embedding run on a remote inference server; this crate
//! holds the typed view of its responses and the face-matching workflow
//! built on top of them.

pub mod decoder;
pub mod gallery;
pub mod resolver;
pub mod types;

pub use decoder::{DecodeError, DetectionKind};
pub use gallery::{Gallery, GalleryError};
pub use resolver::{IdentityResolver, SimilarityScorer};
pub use types::{
    BoundingBox, Classification, DetectedObject, Embedding, Face, GalleryEntry, Keypoint,
    MatchResult, Pose, Thresholds, UNKNOWN_IDENTITY,
};
