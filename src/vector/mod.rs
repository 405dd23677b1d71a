//! Vector index and similarity functionality for media search.
//!
//! This module provides the on-disk vector store and the math used to rank
//! and classify the vectors it holds.
//!
//! # Performance Targets
//! - Index load: one sequential decode of a memory-mapped file
//! - Memory usage: 16 + 4·D bytes per record
//! - Search: brute-force dot product over the full working set
//!
//! # Architecture
//! The whole index lives in memory once loaded. Vectors are expected to be
//! L2-normalized, so the dot product stands in for cosine similarity.

mod classify;
mod shared;
mod similarity;
mod storage;
mod types;

// Re-export core types for public API
pub use classify::{
    ClassificationError, ClassificationResult, Classifier, DEFAULT_CLASSIFICATION_THRESHOLD,
    DEFAULT_CONFIDENCE_MARGIN, classify,
};
pub use shared::SharedVectorStore;
pub use similarity::{
    dot, flatten, mean_prototype, normalize_l2, similarities, top_n, unflatten, update_prototype,
};
pub use storage::{FileVectorStore, HEADER_SIZE, StoreError, record_size};
pub use types::{PrototypeVector, VECTOR_DIMENSION_512, VectorDimension, VectorError, VectorRecord};
