//! Thread-safe async handle over [`FileVectorStore`].
//!
//! Every lock is taken inside tokio's blocking pool, so neither file I/O nor
//! lock contention ever stalls an async worker thread. Reads of a populated
//! cache share a read lock; only loading, mutation and recording the last
//! query take the write lock.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::vector::storage::{FileVectorStore, StoreError};
use crate::vector::types::{VectorDimension, VectorRecord};

/// Cloneable handle to a single vector store.
///
/// Mutations are serialized by the lock; the store itself still assumes a
/// single logical writer (the indexer's batch sink).
#[derive(Clone)]
pub struct SharedVectorStore {
    inner: Arc<RwLock<FileVectorStore>>,
    // fixed for the store's lifetime, so readable without the lock
    path: PathBuf,
    dimension: VectorDimension,
}

impl SharedVectorStore {
    /// Wraps an existing store.
    pub fn new(store: FileVectorStore) -> Self {
        Self {
            path: store.path().to_path_buf(),
            dimension: store.dimension(),
            inner: Arc::new(RwLock::new(store)),
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub async fn get(&self) -> Result<Vec<VectorRecord>, StoreError> {
        self.blocking(|store| {
            load_if_needed(store)?;
            Ok(store.read().cached_records())
        })
        .await
    }

    pub async fn get_by_ids(&self, ids: Vec<i64>) -> Result<Vec<VectorRecord>, StoreError> {
        self.blocking(move |store| {
            load_if_needed(store)?;
            Ok(store.read().cached_by_ids(&ids))
        })
        .await
    }

    pub async fn add(&self, records: Vec<VectorRecord>) -> Result<(), StoreError> {
        self.blocking(move |store| store.write().add(records)).await
    }

    pub async fn remove(&self, ids: Vec<i64>) -> Result<usize, StoreError> {
        self.blocking(move |store| store.write().remove(&ids)).await
    }

    /// Drops the in-memory cache; the next read reloads the file.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.blocking(|store| {
            store.write().clear();
            Ok(())
        })
        .await
    }

    /// Ranks under a shared read lock, then records the result for paging.
    pub async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        threshold: f32,
        filter_ids: Option<Vec<i64>>,
    ) -> Result<Vec<i64>, StoreError> {
        self.blocking(move |store| {
            let ranked = load_if_needed(store).and_then(|()| {
                store
                    .read()
                    .rank(&vector, top_k, threshold, filter_ids.as_deref())
            });
            // a failed query still invalidates the previous result
            let recorded = ranked.as_deref().unwrap_or_default();
            store.write().record_query(recorded);
            ranked
        })
        .await
    }

    /// Pages through the last query's ids; served from memory.
    pub async fn query_page(&self, start: usize, end: usize) -> Result<Vec<i64>, StoreError> {
        self.blocking(move |store| Ok(store.read().query_page(start, end)))
            .await
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&RwLock<FileVectorStore>) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| {
                StoreError::Io(io::Error::other(format!(
                    "vector store task failed: {e}"
                )))
            })?
    }
}

/// Decodes the file under the write lock only when the cache is cold.
fn load_if_needed(store: &RwLock<FileVectorStore>) -> Result<(), StoreError> {
    if store.read().needs_load() {
        // re-checked under the write lock in case another reader loaded first
        store.write().ensure_loaded()?;
    }
    Ok(())
}

impl std::fmt::Debug for SharedVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Try to acquire read lock for debug output
        match self.inner.try_read() {
            Some(store) => write!(f, "SharedVectorStore {{ store: {store:?} }}"),
            None => write!(f, "SharedVectorStore {{ <locked> }}"),
        }
    }
}
