//! Identity resolution against the face gallery.

use crate::gallery::{Gallery, GalleryError};
use crate::types::{Embedding, MatchResult};

/// Strategy for scoring a probe embedding against one stored embedding.
///
/// Implementations never fail: any scoring error must be reported as a
/// score of `0.0` so a single bad comparison cannot abort a gallery scan.
#[allow(async_fn_in_trait)]
pub trait SimilarityScorer {
    async fn score(&self, probe: &Embedding, stored: &Embedding) -> f32;
}

/// Resolves a probe embedding to a gallery name.
///
/// Scans every entry in file order, one scorer call per entry. Every entry
/// scoring strictly above the threshold replaces the previous match, so the
/// last match in file order wins.
pub struct IdentityResolver<S> {
    gallery: Gallery,
    scorer: S,
    threshold: f32,
}

impl<S: SimilarityScorer> IdentityResolver<S> {
    pub fn new(gallery: Gallery, scorer: S, threshold: f32) -> Self {
        Self {
            gallery,
            scorer,
            threshold,
        }
    }

    /// Resolve `probe`, re-reading the gallery file from disk.
    pub async fn resolve(&self, probe: &Embedding) -> Result<MatchResult, GalleryError> {
        let entries = self.gallery.load()?;
        if entries.is_empty() {
            tracing::debug!(path = %self.gallery.path().display(), "gallery empty or missing");
            return Ok(MatchResult::unknown(0.0));
        }

        let mut matched: Option<MatchResult> = None;
        let mut best_score = 0.0f32;

        for (i, entry) in entries.iter().enumerate() {
            let score = self.scorer.score(probe, &entry.embeddings).await;
            tracing::debug!(entry = i, name = %entry.name, score, "compared gallery entry");

            best_score = best_score.max(score);
            if score > self.threshold {
                matched = Some(MatchResult {
                    matched: true,
                    score,
                    name: entry.name.clone(),
                });
            }
        }

        let result = matched.unwrap_or_else(|| MatchResult::unknown(best_score));
        tracing::info!(
            name = %result.name,
            matched = result.matched,
            score = result.score,
            scanned = entries.len(),
            "identity resolved"
        );
        Ok(result)
    }
}
