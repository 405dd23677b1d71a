//! On-device vector index and classification layer for media search.
//!
//! - [`vector`]: the binary vector store, similarity ranking and prototype
//!   classification
//! - [`processing`]: the memory-adaptive batch engine that fills the store
//! - [`indexing`]: embedding providers and the indexer tying them to the store

pub mod config;
pub mod error;
pub mod indexing;
pub mod logging;
pub mod processing;
pub mod vector;

// Explicit exports for better API clarity
pub use config::{ConfigError, Settings};
pub use error::{MediaIndexError, MediaIndexResult};
pub use indexing::{EmbeddingIndexer, EmbeddingProvider, MediaSource, ModelSource};
pub use processing::{
    BatchError, BatchProcessor, ItemProcessor, Metrics, ProcessorListener, ResourceMonitor,
};
pub use vector::{
    Classifier, ClassificationResult, FileVectorStore, SharedVectorStore, StoreError,
    VectorDimension, VectorError, VectorRecord,
};
