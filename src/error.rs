//! Error types for the media vector index
//!
//! Each module owns a focused error enum; [`MediaIndexError`] collects them
//! for callers that drive the whole pipeline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::indexing::ProviderError;
use crate::processing::BatchError;
use crate::vector::{StoreError, VectorError};

/// Top-level error for indexing, storage and search operations
#[derive(Error, Debug)]
pub enum MediaIndexError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl MediaIndexError {
    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(_) => "INVALID_VECTOR",
            Self::Store(StoreError::Corrupted { .. }) => "STORE_CORRUPTED",
            Self::Store(StoreError::Io(_)) => "STORE_IO_ERROR",
            Self::Store(StoreError::Vector(_)) => "INVALID_VECTOR",
            Self::Batch(BatchError::Cancelled) => "CANCELLED",
            Self::Batch(_) => "BATCH_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Store(StoreError::Corrupted { .. }) => vec![
                "Delete the store file and re-index the media collection",
                "Check for disk errors or an interrupted write",
            ],
            Self::Store(StoreError::Io(_)) => vec![
                "Check disk space and permissions on the store directory",
            ],
            Self::Vector(_) | Self::Store(StoreError::Vector(_)) => vec![
                "Make sure store.dimension matches the embedding model output",
            ],
            Self::Batch(BatchError::Cancelled) => vec![
                "Records from completed chunks are already stored; re-run to finish",
            ],
            Self::Batch(_) => vec![
                "Re-run the batch; items already stored are skipped",
            ],
            Self::Config(_) => vec![
                "Check .mediavec/settings.toml and MEDIAVEC_ environment variables",
            ],
            Self::Provider(ProviderError::NotInitialized) => vec![
                "Initialize the embedding provider before indexing",
            ],
            Self::Provider(_) => vec!["Check the model path and that the file is readable"],
        }
    }
}

/// Result type alias for pipeline operations
pub type MediaIndexResult<T> = Result<T, MediaIndexError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_codes() {
        let err: MediaIndexError = StoreError::Corrupted {
            path: PathBuf::from("index.bin"),
            reason: "count too large".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), "STORE_CORRUPTED");
        assert!(!err.recovery_suggestions().is_empty());

        let err: MediaIndexError = BatchError::Cancelled.into();
        assert_eq!(err.status_code(), "CANCELLED");

        let err: MediaIndexError = VectorError::DimensionMismatch {
            expected: 512,
            actual: 3,
        }
        .into();
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
        assert!(err.to_string().contains("512"));
    }
}
