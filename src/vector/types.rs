//! Core record types and validation wrappers for the vector index.
//!
//! Everything stored in or compared against the index goes through these
//! types, so dimension checks happen in exactly one place.

use thiserror::Error;

/// Default dimension for CLIP-style image/text embeddings.
pub const VECTOR_DIMENSION_512: usize = 512;

/// A single embedded media item as persisted by the vector store.
///
/// `id` is caller-assigned (usually the platform media id) and acts as the
/// primary key. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: i64,
    pub timestamp: i64,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    #[must_use]
    pub fn new(id: i64, timestamp: i64, vector: Vec<f32>) -> Self {
        Self {
            id,
            timestamp,
            vector,
        }
    }
}

/// An aggregated class vector used by few-shot classification.
///
/// The sample count behind the prototype is owned by the caller and passed
/// to [`update_prototype`](crate::vector::update_prototype) when new examples
/// arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct PrototypeVector {
    pub id: String,
    pub timestamp: i64,
    pub vector: Vec<f32>,
}

impl PrototypeVector {
    #[must_use]
    pub fn new(id: impl Into<String>, timestamp: i64, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            vector,
        }
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// A store instance holds exactly one dimension; every vector written to
/// or queried against it is checked with [`VectorDimension::validate_vector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates the standard 512-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_512() -> Self {
        Self(VECTOR_DIMENSION_512)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector math and validation.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "No vectors provided for {operation}\nSuggestion: Supply at least one example vector"
    )]
    EmptyInput { operation: &'static str },

    #[error(
        "Cannot normalize a zero-length vector\nSuggestion: Check that the embedder produced non-zero output"
    )]
    ZeroNorm,
}
