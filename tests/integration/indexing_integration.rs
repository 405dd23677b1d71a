//! End-to-end indexing: media ids through the batch engine into the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use mediavec::config::{MemoryConfig, Settings};
use mediavec::indexing::{
    EmbeddingIndexer, EmbeddingProvider, MediaSource, ModelSource, ProviderError,
    load_model_bytes,
};
use mediavec::processing::{FixedMemory, Metrics, ProcessorListener, ResourceMonitor};
use mediavec::vector::{FileVectorStore, SharedVectorStore, VectorDimension, VectorRecord};

const DIM: usize = 3;

/// Media library where each id maps to text "frames".
struct Library(HashMap<i64, Vec<String>>);

#[async_trait]
impl MediaSource<String> for Library {
    async fn load(&self, id: i64) -> anyhow::Result<Vec<String>> {
        self.0
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("media {id} is unreadable"))
    }
}

/// Embeds by counting vowels, consonants and digits, loaded from a model file.
struct CountingEmbedder {
    model: ModelSource,
    ready: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider<String> for CountingEmbedder {
    async fn initialize(&self) -> Result<(), ProviderError> {
        load_model_bytes(&self.model).await?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn embed(&self, input: &String) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let vowels = input.chars().filter(|c| "aeiou".contains(*c)).count() as f32;
        let digits = input.chars().filter(char::is_ascii_digit).count() as f32;
        let others = input.chars().count() as f32 - vowels - digits;
        let norm = (vowels * vowels + digits * digits + others * others).sqrt();
        if norm == 0.0 {
            return Err(ProviderError::Inference("empty input".to_string()));
        }
        Ok(vec![vowels / norm, digits / norm, others / norm])
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(DIM).unwrap()
    }
}

#[derive(Default)]
struct Events {
    errors: Mutex<Vec<i64>>,
    stored: AtomicUsize,
    completed: Mutex<Option<Metrics>>,
}

impl ProcessorListener<i64, VectorRecord> for Events {
    fn on_batch_complete(&self, batch: &[VectorRecord]) {
        self.stored.fetch_add(batch.len(), Ordering::SeqCst);
    }

    fn on_complete(&self, metrics: &Metrics) {
        *self.completed.lock() = Some(metrics.clone());
    }

    fn on_error(&self, _error: &anyhow::Error, item: &i64) {
        self.errors.lock().push(*item);
    }
}

fn library() -> Library {
    Library(HashMap::from([
        (1, vec!["aaaa".to_string()]),
        (2, vec!["1234".to_string()]),
        (3, vec!["xyzw".to_string()]),
        (4, vec!["aa".to_string(), "11".to_string()]),
        (5, vec![String::new()]),
        (6, vec!["aeiou1".to_string()]),
    ]))
}

async fn embedder(dir: &TempDir) -> Arc<CountingEmbedder> {
    let model_path = dir.path().join("model.onnx");
    std::fs::write(&model_path, b"weights").unwrap();
    let embedder = Arc::new(CountingEmbedder {
        model: ModelSource::File(model_path),
        ready: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });
    embedder.initialize().await.unwrap();
    embedder
}

fn settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.store.path = dir.path().join("media_index.bin");
    settings.store.dimension = DIM;
    settings.batch.batch_size = 2;
    settings
}

fn monitor() -> ResourceMonitor {
    ResourceMonitor::new(MemoryConfig::default(), Arc::new(FixedMemory(u64::MAX))).unwrap()
}

#[tokio::test]
async fn test_index_then_query() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    let store = SharedVectorStore::new(FileVectorStore::from_config(&settings.store).unwrap());
    let events = Arc::new(Events::default());

    let processor = EmbeddingIndexer::<String, _, _>::new(library(), embedder(&temp_dir).await, store.clone())
        .into_batch_processor(&settings, monitor())
        .unwrap()
        .with_listener(events.clone());

    // 5 embeds to a failure, 99 has no media
    let metrics = processor.run(vec![1, 2, 3, 4, 5, 6, 99]).await.unwrap();

    assert!(matches!(metrics, Metrics::Success { processed: 5, .. }));
    let mut errors = events.errors.lock().clone();
    errors.sort_unstable();
    assert_eq!(errors, vec![5, 99]);
    assert_eq!(events.stored.load(Ordering::SeqCst), 5);
    assert!(events.completed.lock().is_some());

    let ids: Vec<i64> = store.get().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 6]);

    // the two-frame item sits between pure vowels and pure digits
    let ranked = store
        .query(vec![1.0, 0.0, 0.0], 3, 0.5, None)
        .await
        .unwrap();
    assert_eq!(ranked[0], 1);
    assert!(ranked.contains(&4));
    assert!(!ranked.contains(&2));
    assert_eq!(store.query_page(0, 1).await.unwrap(), vec![1]);

    // restricting to a subset of ids
    let ranked = store
        .query(vec![0.0, 1.0, 0.0], 10, 0.0, Some(vec![2, 3]))
        .await
        .unwrap();
    assert_eq!(ranked[0], 2);
    assert!(ranked.iter().all(|id| [2, 3].contains(id)));
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    let store = SharedVectorStore::new(FileVectorStore::from_config(&settings.store).unwrap());
    let embedder = embedder(&temp_dir).await;

    let processor = EmbeddingIndexer::<String, _, _>::new(library(), Arc::clone(&embedder), store.clone())
        .into_batch_processor(&settings, monitor())
        .unwrap();

    processor.run(vec![1, 2, 3]).await.unwrap();
    let first = store.get().await.unwrap();

    let metrics = processor.run(vec![1, 2, 3]).await.unwrap();
    assert_eq!(metrics.processed(), 3);

    // the originals are kept, nothing is duplicated on disk
    let mut reopened = FileVectorStore::from_config(&settings.store).unwrap();
    let on_disk = reopened.get().unwrap();
    assert_eq!(on_disk.len(), 3);
    assert_eq!(on_disk, first);
}

#[tokio::test]
async fn test_wrong_embedding_dimension_fails_items() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = settings(&temp_dir);
    settings.store.dimension = 8;
    let store = SharedVectorStore::new(FileVectorStore::from_config(&settings.store).unwrap());
    let events = Arc::new(Events::default());

    let processor = EmbeddingIndexer::<String, _, _>::new(library(), embedder(&temp_dir).await, store.clone())
        .into_batch_processor(&settings, monitor())
        .unwrap()
        .with_listener(events.clone());

    let metrics = processor.run(vec![1, 2]).await.unwrap();

    assert_eq!(metrics.processed(), 0);
    assert_eq!(events.errors.lock().len(), 2);
    assert!(!store.exists());
}
