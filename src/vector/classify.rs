//! Few-shot classification against class prototypes.
//!
//! A vector is assigned to the closest prototype only when the match is both
//! strong (above `threshold`) and unambiguous (ahead of the runner-up by at
//! least `confidence_margin`). Single-prototype classification is refused
//! outright: with nothing to compare against, every vector above the
//! threshold would be accepted.

use crate::config::ClassificationConfig;
use crate::vector::similarity::{similarities, top_n};
use crate::vector::types::{PrototypeVector, VectorError};

/// Default minimum similarity for a conclusive match.
pub const DEFAULT_CLASSIFICATION_THRESHOLD: f32 = 0.4;

/// Default minimum gap between the best and second-best match.
pub const DEFAULT_CONFIDENCE_MARGIN: f32 = 0.05;

/// Why a classification was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationError {
    /// Fewer than two prototypes were supplied.
    MinimumClassSize,
    /// The best match scored below the threshold.
    Threshold,
    /// The two best matches were too close to call.
    ConfidenceMargin,
}

impl ClassificationError {
    /// Stable identifier for logs and serialized results.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MinimumClassSize => "MINIMUM_CLASS_SIZE",
            Self::Threshold => "THRESHOLD",
            Self::ConfidenceMargin => "CONFIDENCE_MARGIN",
        }
    }
}

impl std::fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    Success { class_id: String, similarity: f32 },
    Failure(ClassificationError),
}

impl ClassificationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the matched class id, if any.
    #[must_use]
    pub fn class_id(&self) -> Option<&str> {
        match self {
            Self::Success { class_id, .. } => Some(class_id),
            Self::Failure(_) => None,
        }
    }
}

/// Classifies `vector` against `prototypes`.
///
/// # Algorithm
/// 1. Fewer than 2 prototypes fails with `MinimumClassSize`
/// 2. Score every prototype and take the top two (no threshold filter yet)
/// 3. Best below `threshold` fails with `Threshold`
/// 4. Best minus second-best below `confidence_margin` fails with `ConfidenceMargin`
/// 5. Otherwise the best prototype wins
///
/// # Errors
/// [`VectorError::DimensionMismatch`] when a prototype's length differs from
/// the query's.
pub fn classify(
    vector: &[f32],
    prototypes: &[PrototypeVector],
    threshold: f32,
    confidence_margin: f32,
) -> Result<ClassificationResult, VectorError> {
    if prototypes.len() < 2 {
        return Ok(ClassificationResult::Failure(
            ClassificationError::MinimumClassSize,
        ));
    }
    check_dimensions(vector.len(), prototypes)?;

    let candidates: Vec<&[f32]> = prototypes.iter().map(|p| p.vector.as_slice()).collect();
    let scores = similarities(vector, &candidates);

    // threshold of -inf so that negative similarities still rank
    let top2 = top_n(&scores, 2, f32::NEG_INFINITY);
    let Some(&best_index) = top2.first() else {
        // every score was NaN
        return Ok(ClassificationResult::Failure(ClassificationError::Threshold));
    };
    let best = scores[best_index];
    let second = top2.get(1).map_or(0.0, |&i| scores[i]);

    if best < threshold {
        return Ok(ClassificationResult::Failure(ClassificationError::Threshold));
    }
    if best - second < confidence_margin {
        return Ok(ClassificationResult::Failure(
            ClassificationError::ConfidenceMargin,
        ));
    }

    Ok(ClassificationResult::Success {
        class_id: prototypes[best_index].id.clone(),
        similarity: best,
    })
}

fn check_dimensions(expected: usize, prototypes: &[PrototypeVector]) -> Result<(), VectorError> {
    match prototypes.iter().find(|p| p.vector.len() != expected) {
        Some(p) => Err(VectorError::DimensionMismatch {
            expected,
            actual: p.vector.len(),
        }),
        None => Ok(()),
    }
}

/// A prototype set bundled with its decision thresholds.
#[derive(Debug, Clone)]
pub struct Classifier {
    prototypes: Vec<PrototypeVector>,
    threshold: f32,
    confidence_margin: f32,
}

impl Classifier {
    /// Creates a classifier with the default threshold and margin.
    pub fn new(prototypes: Vec<PrototypeVector>) -> Self {
        Self {
            prototypes,
            threshold: DEFAULT_CLASSIFICATION_THRESHOLD,
            confidence_margin: DEFAULT_CONFIDENCE_MARGIN,
        }
    }

    /// Creates a classifier using thresholds from configuration.
    pub fn from_config(prototypes: Vec<PrototypeVector>, config: &ClassificationConfig) -> Self {
        Self {
            prototypes,
            threshold: config.threshold,
            confidence_margin: config.confidence_margin,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_confidence_margin(mut self, confidence_margin: f32) -> Self {
        self.confidence_margin = confidence_margin;
        self
    }

    /// Replaces or inserts a prototype by class id.
    ///
    /// The prototype must match the length of the ones already held.
    pub fn upsert_prototype(&mut self, prototype: PrototypeVector) -> Result<(), VectorError> {
        if let Some(first) = self.prototypes.iter().find(|p| p.id != prototype.id) {
            if first.vector.len() != prototype.vector.len() {
                return Err(VectorError::DimensionMismatch {
                    expected: first.vector.len(),
                    actual: prototype.vector.len(),
                });
            }
        }
        match self.prototypes.iter_mut().find(|p| p.id == prototype.id) {
            Some(existing) => *existing = prototype,
            None => self.prototypes.push(prototype),
        }
        Ok(())
    }

    #[must_use]
    pub fn prototypes(&self) -> &[PrototypeVector] {
        &self.prototypes
    }

    pub fn classify(&self, vector: &[f32]) -> Result<ClassificationResult, VectorError> {
        let result = classify(
            vector,
            &self.prototypes,
            self.threshold,
            self.confidence_margin,
        )?;
        if let ClassificationResult::Failure(reason) = &result {
            tracing::debug!(reason = %reason, "classification rejected");
        }
        Ok(result)
    }
}
