//! Adaptive batch execution.
//!
//! [`BatchProcessor`] drives an [`ItemProcessor`] over a list of items in
//! sequential chunks, running each chunk's items concurrently up to the level
//! chosen by [`ResourceMonitor`] from the current free memory.

mod batch;
mod listener;
mod memory;

pub use batch::{BatchError, BatchProcessor, DEFAULT_BATCH_SIZE, ItemProcessor, non_cancellable};
pub use listener::{Metrics, NoopListener, ProcessorListener};
pub use memory::{FixedMemory, MemorySource, ResourceMonitor, SystemMemory, concurrency_for};
