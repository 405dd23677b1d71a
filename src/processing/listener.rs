//! Run metrics and progress observation for batch processing.

use std::sync::Arc;
use std::time::Duration;

use crate::processing::batch::BatchError;

/// Outcome of one [`BatchProcessor::run`](crate::processing::BatchProcessor::run).
#[derive(Debug, Clone)]
pub enum Metrics {
    /// Every chunk was processed; `processed` counts successful items only.
    Success { processed: usize, elapsed: Duration },
    /// A run-level error aborted the remaining chunks.
    Failure {
        processed_before_failure: usize,
        elapsed: Duration,
        cause: Arc<BatchError>,
    },
}

impl Metrics {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Successful items, whether or not the run completed.
    #[must_use]
    pub fn processed(&self) -> usize {
        match self {
            Self::Success { processed, .. } => *processed,
            Self::Failure {
                processed_before_failure,
                ..
            } => *processed_before_failure,
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Success { elapsed, .. } | Self::Failure { elapsed, .. } => *elapsed,
        }
    }
}

/// Observer hooks for a batch run. Every hook defaults to a no-op.
///
/// `on_progress` and `on_error` are called from the item tasks in
/// completion order; the other hooks are called from the driving task.
pub trait ProcessorListener<I, O>: Send + Sync {
    /// The run has items and is starting.
    fn on_active(&self) {}

    /// Fraction of items finished (successfully or not), in `(0, 1]`.
    fn on_progress(&self, _progress: f32) {}

    /// A chunk's successful outputs, after the processor's sink accepted them.
    fn on_batch_complete(&self, _batch: &[O]) {}

    fn on_complete(&self, _metrics: &Metrics) {}

    /// A single item failed; the run continues without it.
    fn on_error(&self, _error: &anyhow::Error, _item: &I) {}

    fn on_fail(&self, _metrics: &Metrics) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl<I, O> ProcessorListener<I, O> for NoopListener {}
