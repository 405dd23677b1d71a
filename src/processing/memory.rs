//! Memory-pressure driven concurrency sizing.
//!
//! The batch processor asks the monitor for a concurrency level before every
//! chunk, so parallelism shrinks as free memory drops mid-run and grows back
//! when it recovers.

use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::System;

use crate::config::{ConfigError, MemoryConfig};

/// Source of the free-memory signal.
pub trait MemorySource: Send + Sync {
    /// Currently available memory in bytes.
    fn free_memory_bytes(&self) -> u64;
}

/// Reads available system memory through `sysinfo`.
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for SystemMemory {
    fn free_memory_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.available_memory()
    }
}

/// A fixed reading, for hosts that supply their own signal snapshot.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemorySource for FixedMemory {
    fn free_memory_bytes(&self) -> u64 {
        self.0
    }
}

/// Maps a free-memory reading to a concurrency level.
///
/// Below `low_memory_threshold` the minimum applies, at or above
/// `high_memory_threshold` the maximum, and in between the level is
/// linearly interpolated and floored.
pub fn concurrency_for(free_memory: u64, options: &MemoryConfig) -> usize {
    if free_memory < options.low_memory_threshold {
        return options.min_concurrency;
    }
    if free_memory >= options.high_memory_threshold {
        return options.max_concurrency;
    }

    let span = (options.high_memory_threshold - options.low_memory_threshold) as f64;
    let proportion = (free_memory - options.low_memory_threshold) as f64 / span;
    let extra = proportion * (options.max_concurrency - options.min_concurrency) as f64;

    (options.min_concurrency + extra.floor() as usize).max(options.min_concurrency)
}

/// Resource monitor consulted by the batch processor.
#[derive(Clone)]
pub struct ResourceMonitor {
    options: MemoryConfig,
    source: Arc<dyn MemorySource>,
}

impl ResourceMonitor {
    /// Creates a monitor over `source`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the thresholds or concurrency bounds are
    /// out of order or the minimum is zero.
    pub fn new(options: MemoryConfig, source: Arc<dyn MemorySource>) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self { options, source })
    }

    /// Creates a monitor reading real system memory.
    pub fn system(options: MemoryConfig) -> Result<Self, ConfigError> {
        Self::new(options, Arc::new(SystemMemory::new()))
    }

    #[must_use]
    pub fn options(&self) -> &MemoryConfig {
        &self.options
    }

    pub fn free_memory_bytes(&self) -> u64 {
        self.source.free_memory_bytes()
    }

    /// Concurrency level for the current memory reading.
    pub fn concurrency_level(&self) -> usize {
        let free = self.free_memory_bytes();
        let level = concurrency_for(free, &self.options);
        tracing::debug!(free_memory = free, concurrency = level, "sized concurrency");
        level
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
