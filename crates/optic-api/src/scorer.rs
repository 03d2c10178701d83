//! Face similarity scored by the server's compare endpoint.

use crate::client::{ApiClient, ApiError, Endpoint};
use optic_core::decoder::{self, DecodeError};
use optic_core::{Embedding, SimilarityScorer};
use serde::Serialize;
use thiserror::Error;

/// The compare endpoint's confidence is multiplied by this before use.
const COMPARE_SCORE_SCALE: f32 = 10.0;
/// Decimal places kept for embedding values in compare requests.
const COMPARE_DECIMAL_PLACES: usize = 2;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Serialize)]
struct CompareRequest {
    face1: FaceEmbeddings,
    face2: FaceEmbeddings,
}

#[derive(Serialize)]
struct FaceEmbeddings {
    embeddings: Embedding,
}

/// [`SimilarityScorer`] backed by `POST /v1/compareface`.
#[derive(Clone)]
pub struct RemoteScorer {
    client: ApiClient,
}

impl RemoteScorer {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Compare two embeddings remotely, returning the scaled score.
    pub async fn compare(&self, a: &Embedding, b: &Embedding) -> Result<f32, CompareError> {
        let request = CompareRequest {
            face1: FaceEmbeddings {
                embeddings: a.truncated(COMPARE_DECIMAL_PLACES),
            },
            face2: FaceEmbeddings {
                embeddings: b.truncated(COMPARE_DECIMAL_PLACES),
            },
        };
        let raw = self.client.post_json(Endpoint::CompareFace, &request).await?;
        let confidence = decoder::decode_comparison(&raw)?;
        Ok(confidence * COMPARE_SCORE_SCALE)
    }
}

impl SimilarityScorer for RemoteScorer {
    async fn score(&self, probe: &Embedding, stored: &Embedding) -> f32 {
        match self.compare(probe, stored).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(error = %e, "face compare failed; scoring as 0");
                0.0
            }
        }
    }
}
