//! Mean Euclidean distance scoring between two landmark point sets.

use crate::types::{AbsolutePoint, Classification, ComparisonResult};
use thiserror::Error;

/// Mean-distance threshold below which two faces are classified as the same.
///
/// Expressed in canvas units, so it only holds its meaning for the canvas
/// size it was tuned against (750×750).
pub const DEFAULT_THRESHOLD: f64 = 0.13;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("point count mismatch: reference has {reference}, candidate has {candidate}")]
    LengthMismatch { reference: usize, candidate: usize },
    #[error("both point sets are empty")]
    EmptyPointSet,
}

/// Scores two equal-length point sequences by mean per-point distance.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer {
    threshold: f64,
}

impl SimilarityScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare `reference` against `candidate` point by point.
    ///
    /// Index `i` of each slice must denote the same landmark.
    pub fn score(
        &self,
        reference: &[AbsolutePoint],
        candidate: &[AbsolutePoint],
    ) -> Result<ComparisonResult, ScoreError> {
        if reference.len() != candidate.len() {
            return Err(ScoreError::LengthMismatch {
                reference: reference.len(),
                candidate: candidate.len(),
            });
        }
        if reference.is_empty() {
            return Err(ScoreError::EmptyPointSet);
        }

        let mut total = 0.0f64;
        for (i, (a, b)) in reference.iter().zip(candidate).enumerate() {
            let distance = a.distance(b);
            tracing::trace!(point = i, distance, "landmark distance");
            total += distance;
        }

        let point_count = reference.len();
        let mean_distance = total / point_count as f64;
        let classification = if mean_distance < self.threshold {
            Classification::Same
        } else {
            Classification::Different
        };

        tracing::debug!(
            point_count,
            mean_distance,
            threshold = self.threshold,
            ?classification,
            "scored landmark sets"
        );

        Ok(ComparisonResult {
            mean_distance,
            classification,
            threshold: self.threshold,
            point_count,
        })
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
