// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::core::types::RecordId;
use crate::storage::object::StorageError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate id: {0}")]
    DuplicateId(RecordId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("Unsupported snapshot version: found {found}, supported {supported}")]
    UnsupportedSnapshotVersion { found: u32, supported: u32 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Batch partially applied: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialFailure {
        succeeded: Vec<RecordId>,
        failed: Vec<(RecordId, String)>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StoreError {
    pub fn record_not_found(id: &RecordId) -> Self {
        StoreError::NotFound(format!("record {}", id))
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() || matches!(err, StorageError::Exhausted { .. }) {
            StoreError::StorageUnavailable(err.to_string())
        } else {
            StoreError::Storage(err)
        }
    }
}
