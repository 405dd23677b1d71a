//! Chunked, memory-aware concurrent batch execution.
//!
//! Items are processed in fixed-size chunks. Chunks run one after another;
//! inside a chunk every item gets its own task, gated by a semaphore sized
//! from the [`ResourceMonitor`] reading taken when the chunk starts.
//!
//! # Failure Model
//! - An item error is reported through `on_error` and the item is dropped
//!   from the chunk output. The run keeps going.
//! - A sink error or a panicking item task aborts the remaining chunks and
//!   is returned as [`Metrics::Failure`].
//! - Cancellation is returned as [`BatchError::Cancelled`], never as metrics.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{BatchConfig, ConfigError};
use crate::processing::listener::{Metrics, NoopListener, ProcessorListener};
use crate::processing::memory::ResourceMonitor;

/// Default number of items per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors that escape per-item isolation.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch run was cancelled")]
    Cancelled,

    #[error(
        "Batch sink failed: {0:#}\nSuggestion: Check the vector store for corruption or disk errors"
    )]
    Sink(anyhow::Error),

    #[error("Item task panicked: {0}")]
    TaskPanicked(String),

    #[error("Invalid batch configuration: {0}")]
    Config(#[from] ConfigError),
}

/// The per-item transform and the per-chunk sink driven by [`BatchProcessor`].
#[async_trait]
pub trait ItemProcessor<I, O>: Send + Sync + 'static
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Transforms one item. Errors are isolated to this item.
    async fn process(&self, item: I) -> anyhow::Result<O>;

    /// Receives a chunk's successful outputs in submission order.
    ///
    /// An error here aborts the run.
    async fn on_batch_complete(&self, batch: &[O]) -> anyhow::Result<()>;
}

/// Runs `future` on its own task so that cancelling the caller cannot
/// interrupt it once started.
pub async fn non_cancellable<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(future)
        .await
        .map_err(|e| anyhow::anyhow!("non-cancellable task failed: {e}"))
}

/// Adaptive batch processor.
pub struct BatchProcessor<I, O, P> {
    processor: Arc<P>,
    listener: Arc<dyn ProcessorListener<I, O>>,
    monitor: ResourceMonitor,
    batch_size: usize,
}

impl<I, O, P> BatchProcessor<I, O, P>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
    P: ItemProcessor<I, O>,
{
    /// Creates a processor with the default chunk size and no listener.
    pub fn new(processor: P, monitor: ResourceMonitor) -> Self {
        Self {
            processor: Arc::new(processor),
            listener: Arc::new(NoopListener),
            monitor,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Creates a processor using the chunk size from configuration.
    pub fn from_config(
        processor: P,
        monitor: ResourceMonitor,
        config: &BatchConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(processor, monitor).with_batch_size(config.batch_size)
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProcessorListener<I, O>>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Processes `items` to completion.
    pub async fn run(&self, items: Vec<I>) -> Result<Metrics, BatchError> {
        self.run_with_cancel(items, CancellationToken::new()).await
    }

    /// Processes `items` until done or until `cancel` fires.
    ///
    /// # Returns
    /// - `Ok(Metrics::Success)` when every chunk was processed
    /// - `Ok(Metrics::Failure)` when a run-level error stopped the run
    /// - `Err(BatchError::Cancelled)` when `cancel` fired
    pub async fn run_with_cancel(
        &self,
        items: Vec<I>,
        cancel: CancellationToken,
    ) -> Result<Metrics, BatchError> {
        let start = Instant::now();

        if items.is_empty() {
            tracing::warn!("No items to process");
            let metrics = Metrics::Success {
                processed: 0,
                elapsed: start.elapsed(),
            };
            self.listener.on_complete(&metrics);
            return Ok(metrics);
        }

        self.listener.on_active();

        let total = items.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let mut total_success = 0;
        let mut remaining = items.into_iter();

        loop {
            let chunk: Vec<I> = remaining.by_ref().take(self.batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                tracing::info!(processed = total_success, "batch run cancelled");
                return Err(BatchError::Cancelled);
            }

            let outputs = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(processed = total_success, "batch run cancelled mid-chunk");
                    return Err(BatchError::Cancelled);
                }
                outputs = self.process_chunk(chunk, total, &completed) => outputs,
            };

            let result = match outputs {
                Ok(batch) => self
                    .processor
                    .on_batch_complete(&batch)
                    .await
                    .map(|()| batch)
                    .map_err(BatchError::Sink),
                Err(e) => Err(e),
            };

            match result {
                Ok(batch) => {
                    total_success += batch.len();
                    self.listener.on_batch_complete(&batch);
                }
                Err(cause) => {
                    tracing::error!(
                        processed = total_success,
                        error = %cause,
                        "batch run failed"
                    );
                    let metrics = Metrics::Failure {
                        processed_before_failure: total_success,
                        elapsed: start.elapsed(),
                        cause: Arc::new(cause),
                    };
                    self.listener.on_fail(&metrics);
                    return Ok(metrics);
                }
            }
        }

        let metrics = Metrics::Success {
            processed: total_success,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            processed = total_success,
            total,
            elapsed_ms = metrics.elapsed().as_millis() as u64,
            "batch run complete"
        );
        self.listener.on_complete(&metrics);
        Ok(metrics)
    }

    /// Runs one chunk and returns its successful outputs in submission order.
    ///
    /// Dropping the returned future aborts every item task of the chunk.
    async fn process_chunk(
        &self,
        chunk: Vec<I>,
        total: usize,
        completed: &Arc<AtomicUsize>,
    ) -> Result<Vec<O>, BatchError> {
        let concurrency = self.monitor.concurrency_level();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let chunk_len = chunk.len();
        tracing::debug!(items = chunk_len, concurrency, "processing chunk");

        let mut tasks = JoinSet::new();
        for (index, item) in chunk.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let processor = Arc::clone(&self.processor);
            let listener = Arc::clone(&self.listener);
            let completed = Arc::clone(completed);

            tasks.spawn(async move {
                // the semaphore is never closed
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, None);
                };

                let output = match processor.process(item.clone()).await {
                    Ok(output) => Some(output),
                    Err(e) => {
                        tracing::warn!(error = %e, "item failed");
                        listener.on_error(&e, &item);
                        None
                    }
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                listener.on_progress(done as f32 / total as f32);
                (index, output)
            });
        }

        let mut slots: Vec<Option<O>> = (0..chunk_len).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, output)) => slots[index] = output,
                Err(e) if e.is_panic() => return Err(BatchError::TaskPanicked(e.to_string())),
                Err(e) => return Err(BatchError::TaskPanicked(format!("item task aborted: {e}"))),
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
