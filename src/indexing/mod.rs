//! Media indexing: embedding providers and the processor that stores their output.

mod indexer;
mod provider;

pub use indexer::{EmbeddingIndexer, MediaSource};
pub use provider::{EmbeddingProvider, ModelSource, ProviderError, load_model_bytes};
