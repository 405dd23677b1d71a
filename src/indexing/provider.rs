//! Embedding provider abstraction and model loading.
//!
//! Providers wrap an inference runtime behind the lifecycle
//! `initialize` → `is_initialized` → `embed`. Where the model weights come
//! from is chosen at construction through [`ModelSource`].

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::vector::VectorDimension;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Embedding provider is not initialized\nSuggestion: Call initialize() before embedding")]
    NotInitialized,

    #[error("Failed to read model file '{path}': {source}")]
    ModelLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Model source is empty")]
    EmptyModel,

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Where a provider's model weights are read from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// A model file on disk
    File(PathBuf),
    /// Weights compiled into the binary, e.g. with `include_bytes!`
    Bundled(&'static [u8]),
}

impl ModelSource {
    /// Human-readable origin for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Bundled(bytes) => format!("<bundled, {} bytes>", bytes.len()),
        }
    }
}

/// Reads the raw model bytes for `source`.
pub async fn load_model_bytes(source: &ModelSource) -> Result<Vec<u8>, ProviderError> {
    let bytes = match source {
        ModelSource::File(path) => {
            tokio::fs::read(path)
                .await
                .map_err(|source| ProviderError::ModelLoad {
                    path: path.clone(),
                    source,
                })?
        }
        ModelSource::Bundled(bytes) => bytes.to_vec(),
    };

    if bytes.is_empty() {
        return Err(ProviderError::EmptyModel);
    }
    tracing::debug!(
        source = %source.describe(),
        bytes = bytes.len(),
        "loaded model"
    );
    Ok(bytes)
}

/// Produces vectors from media inputs of type `I`.
///
/// Implementations should be thread-safe; the indexer calls them from
/// several tasks at once.
#[async_trait]
pub trait EmbeddingProvider<I>: Send + Sync
where
    I: Send + Sync + 'static,
{
    /// Loads the model. Calling it again after success is a no-op.
    async fn initialize(&self) -> Result<(), ProviderError>;

    fn is_initialized(&self) -> bool;

    /// Embeds a single input.
    async fn embed(&self, input: &I) -> Result<Vec<f32>, ProviderError>;

    /// Embeds several inputs, preserving order.
    async fn embed_batch(&self, inputs: &[I]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for input in inputs {
            vectors.push(self.embed(input).await?);
        }
        Ok(vectors)
    }

    /// Dimension of every vector this provider produces.
    fn dimension(&self) -> VectorDimension;
}
