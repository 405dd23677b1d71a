//! Embedding indexer: the item processor that fills the vector store.
//!
//! Each item id is resolved to one or more media inputs through a
//! [`MediaSource`]. A single input (a still image) is embedded directly;
//! several inputs (frames of a video) are embedded together and collapsed
//! into their normalized mean.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::Settings;
use crate::indexing::provider::{EmbeddingProvider, ProviderError};
use crate::processing::{
    BatchProcessor, ItemProcessor, ResourceMonitor, non_cancellable,
};
use crate::vector::{SharedVectorStore, VectorRecord, mean_prototype};

/// Resolves an item id to the media inputs that represent it.
#[async_trait]
pub trait MediaSource<I>: Send + Sync + 'static {
    /// Returns one input for a still item or several frames for a moving one.
    async fn load(&self, id: i64) -> anyhow::Result<Vec<I>>;
}

/// Item processor turning media ids into stored vectors.
pub struct EmbeddingIndexer<I, S, E> {
    source: S,
    provider: Arc<E>,
    store: SharedVectorStore,
    _input: PhantomData<fn() -> I>,
}

impl<I, S, E> EmbeddingIndexer<I, S, E>
where
    I: Send + Sync + 'static,
    S: MediaSource<I>,
    E: EmbeddingProvider<I> + 'static,
{
    pub fn new(source: S, provider: Arc<E>, store: SharedVectorStore) -> Self {
        Self {
            source,
            provider,
            store,
            _input: PhantomData,
        }
    }

    /// Wraps this indexer in a batch processor sized from `settings`.
    pub fn into_batch_processor(
        self,
        settings: &Settings,
        monitor: ResourceMonitor,
    ) -> Result<BatchProcessor<i64, VectorRecord, Self>, crate::config::ConfigError> {
        BatchProcessor::from_config(self, monitor, &settings.batch)
    }

    #[must_use]
    pub fn store(&self) -> &SharedVectorStore {
        &self.store
    }

    async fn embed_inputs(&self, id: i64, inputs: Vec<I>) -> anyhow::Result<Vec<f32>> {
        let provider = Arc::clone(&self.provider);

        // Embedding runs to completion even if the batch run is cancelled.
        let vector = match inputs.len() {
            0 => anyhow::bail!("No media found for item {id}"),
            1 => {
                non_cancellable(async move {
                    let input = &inputs[0];
                    provider.embed(input).await
                })
                .await??
            }
            frames => {
                let vectors =
                    non_cancellable(async move { provider.embed_batch(&inputs).await })
                        .await??;
                tracing::debug!(id, frames, "averaging frame embeddings");
                mean_prototype(&vectors)?
            }
        };
        Ok(vector)
    }
}

#[async_trait]
impl<I, S, E> ItemProcessor<i64, VectorRecord> for EmbeddingIndexer<I, S, E>
where
    I: Send + Sync + 'static,
    S: MediaSource<I>,
    E: EmbeddingProvider<I> + 'static,
{
    async fn process(&self, id: i64) -> anyhow::Result<VectorRecord> {
        if !self.provider.is_initialized() {
            return Err(ProviderError::NotInitialized.into());
        }

        let inputs = self.source.load(id).await?;
        let vector = self.embed_inputs(id, inputs).await?;
        self.store.dimension().validate_vector(&vector)?;

        Ok(VectorRecord::new(id, Utc::now().timestamp_millis(), vector))
    }

    async fn on_batch_complete(&self, batch: &[VectorRecord]) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.store.add(batch.to_vec()).await?;
        tracing::info!(records = batch.len(), "stored embedding batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{FileVectorStore, VectorDimension};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Items are lists of 2-d "frames" given directly as vectors.
    struct Frames(HashMap<i64, Vec<[f32; 2]>>);

    #[async_trait]
    impl MediaSource<[f32; 2]> for Frames {
        async fn load(&self, id: i64) -> anyhow::Result<Vec<[f32; 2]>> {
            self.0
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown item {id}"))
        }
    }

    struct Identity {
        ready: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider<[f32; 2]> for Identity {
        async fn initialize(&self) -> Result<(), ProviderError> {
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn embed(&self, input: &[f32; 2]) -> Result<Vec<f32>, ProviderError> {
            Ok(input.to_vec())
        }

        fn dimension(&self) -> VectorDimension {
            VectorDimension::new(2).unwrap()
        }
    }

    fn indexer(dir: &TempDir, ready: bool) -> EmbeddingIndexer<[f32; 2], Frames, Identity> {
        let store = SharedVectorStore::new(FileVectorStore::new(
            dir.path().join("index.bin"),
            VectorDimension::new(2).unwrap(),
        ));
        let frames = Frames(HashMap::from([
            (1, vec![[1.0, 0.0]]),
            (2, vec![[1.0, 0.0], [0.0, 1.0]]),
            (3, vec![]),
        ]));
        EmbeddingIndexer::new(
            frames,
            Arc::new(Identity {
                ready: AtomicBool::new(ready),
            }),
            store,
        )
    }

    #[tokio::test]
    async fn test_single_input_embedded_directly() {
        let temp_dir = TempDir::new().unwrap();
        let indexer = indexer(&temp_dir, true);

        let before = Utc::now().timestamp_millis();
        let record = indexer.process(1).await.unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.vector, vec![1.0, 0.0]);
        assert!(record.timestamp >= before);
    }

    #[tokio::test]
    async fn test_frames_are_averaged_and_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let indexer = indexer(&temp_dir, true);

        let record = indexer.process(2).await.unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((record.vector[0] - expected).abs() < 1e-6);
        assert!((record.vector[1] - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_media_fails_the_item() {
        let temp_dir = TempDir::new().unwrap();
        let indexer = indexer(&temp_dir, true);

        assert!(indexer.process(3).await.is_err());
        assert!(indexer.process(99).await.is_err());
    }

    #[tokio::test]
    async fn test_uninitialized_provider_fails_the_item() {
        let temp_dir = TempDir::new().unwrap();
        let indexer = indexer(&temp_dir, false);

        let err = indexer.process(1).await.unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().is_some());
    }

    #[tokio::test]
    async fn test_batch_sink_writes_store() {
        let temp_dir = TempDir::new().unwrap();
        let indexer = indexer(&temp_dir, true);

        let batch = vec![
            VectorRecord::new(1, 10, vec![1.0, 0.0]),
            VectorRecord::new(2, 11, vec![0.0, 1.0]),
        ];
        indexer.on_batch_complete(&batch).await.unwrap();

        let stored = indexer.store().get().await.unwrap();
        assert_eq!(stored, batch);
    }
}
