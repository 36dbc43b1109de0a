//! Template matching strategies and robust score aggregation.

use crate::config::Pipeline;
use crate::types::{Embedding, FaceTemplate, VerificationResult};
use thiserror::Error;

/// Vectors at least this long are treated as true embeddings (cosine);
/// shorter ones as flattened pixel encodings (correlation).
pub const EMBEDDING_MIN_DIM: usize = 128;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("template is empty")]
    EmptyTemplate,
    #[error("no stored embedding has length {probe} (template has {stored:?})")]
    DimensionalityMismatch { probe: usize, stored: Vec<usize> },
    #[error("every comparison was degenerate")]
    NoValidScores,
}

/// Top-K aggregation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregation {
    pub top_k: usize,
    /// Use the median when at least this many scores survive, the mean otherwise.
    pub median_min: usize,
    /// Cap on stored embeddings compared per probe.
    pub max_comparisons: usize,
}

impl Default for Aggregation {
    fn default() -> Self {
        Self {
            top_k: 7,
            median_min: 3,
            max_comparisons: 200,
        }
    }
}

/// Summarize similarity scores: sort descending, keep the top K, then take the
/// median (when at least `median_min` remain) or the mean.
pub fn aggregate(mut scores: Vec<f32>, top_k: usize, median_min: usize) -> Option<f32> {
    scores.retain(|s| s.is_finite());
    if scores.is_empty() {
        return None;
    }
    scores.sort_by(|a, b| b.total_cmp(a));
    scores.truncate(top_k.max(1));

    let n = scores.len();
    if n >= median_min {
        Some(if n % 2 == 1 {
            scores[n / 2]
        } else {
            (scores[n / 2 - 1] + scores[n / 2]) / 2.0
        })
    } else {
        Some(scores.iter().sum::<f32>() / n as f32)
    }
}

/// Map a similarity in [-1, 1] to a confidence in [0, 1].
pub fn to_confidence(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Strategy for comparing a probe embedding against a stored template.
pub trait Matcher: Send + Sync {
    /// Similarity in [-1, 1]; `None` for degenerate pairs.
    fn similarity(&self, probe: &Embedding, stored: &Embedding) -> Option<f32>;

    fn name(&self) -> &'static str;

    /// Tolerance used when the configuration does not override it.
    fn default_tolerance(&self) -> f32;

    /// Score `probe` against the compatible part of `template` and decide.
    fn compare(
        &self,
        probe: &Embedding,
        template: &FaceTemplate,
        tolerance: f32,
        aggregation: &Aggregation,
    ) -> Result<VerificationResult, MatchError> {
        if template.is_empty() {
            return Err(MatchError::EmptyTemplate);
        }

        let compatible: Vec<&Embedding> = template
            .compatible(probe.dim())
            .take(aggregation.max_comparisons)
            .collect();
        if compatible.is_empty() {
            return Err(MatchError::DimensionalityMismatch {
                probe: probe.dim(),
                stored: template.dimensions(),
            });
        }

        let scores: Vec<f32> = compatible
            .iter()
            .filter_map(|stored| self.similarity(probe, stored))
            .collect();
        tracing::trace!(
            matcher = self.name(),
            compared = compatible.len(),
            valid = scores.len(),
            "scored template"
        );

        let agg = aggregate(scores, aggregation.top_k, aggregation.median_min)
            .ok_or(MatchError::NoValidScores)?;
        let confidence = to_confidence(agg);

        Ok(VerificationResult {
            matched: confidence > tolerance,
            confidence,
        })
    }
}

/// Cosine similarity for embeddings, correlation for short pixel encodings.
pub struct EmbeddingCosineMatcher;

impl Matcher for EmbeddingCosineMatcher {
    fn similarity(&self, probe: &Embedding, stored: &Embedding) -> Option<f32> {
        if probe.dim() >= EMBEDDING_MIN_DIM && stored.dim() >= EMBEDDING_MIN_DIM {
            probe.similarity(stored)
        } else {
            probe.correlation(stored)
        }
    }

    fn name(&self) -> &'static str {
        "embedding_cosine"
    }

    fn default_tolerance(&self) -> f32 {
        Pipeline::Embedding.default_tolerance()
    }
}

/// Pearson correlation between normalized pixel encodings.
pub struct LegacyCorrelationMatcher;

impl Matcher for LegacyCorrelationMatcher {
    fn similarity(&self, probe: &Embedding, stored: &Embedding) -> Option<f32> {
        probe.correlation(stored)
    }

    fn name(&self) -> &'static str {
        "legacy_correlation"
    }

    fn default_tolerance(&self) -> f32 {
        Pipeline::Legacy.default_tolerance()
    }
}
