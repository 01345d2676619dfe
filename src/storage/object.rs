// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Throttled: {0}")]
    Throttled(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<StorageError>,
    },
}

impl StorageError {
    /// Timeouts, throttling and connectivity failures may succeed on retry.
    /// Everything else is deterministic and propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout(_) | StorageError::Throttled(_) | StorageError::NetworkError(_)
        )
    }
}

/// Per-item outcome of a batched request, aligned with the submitted items.
pub type BatchOutcome = Vec<Result<(), StorageError>>;

/// Key/object store the remote backend writes records and snapshots to.
///
/// `get` returns `Ok(None)` for a missing key and `delete` of a missing key
/// succeeds. The batch methods return `Err` only when the request as a whole
/// failed; individual item failures are reported in the outcome list.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Credential and reachability check.
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put_batch(&self, items: Vec<(String, Vec<u8>)>) -> Result<BatchOutcome, StorageError> {
        let mut results = Vec::with_capacity(items.len());
        for (key, data) in items {
            results.push(self.put(&key, data).await);
        }
        Ok(results)
    }

    async fn delete_batch(&self, keys: Vec<String>) -> Result<BatchOutcome, StorageError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.delete(&key).await);
        }
        Ok(results)
    }
}

#[async_trait]
impl<T: ObjectStorage + ?Sized> ObjectStorage for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        (**self).put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list(prefix).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        (**self).health_check().await
    }

    async fn put_batch(&self, items: Vec<(String, Vec<u8>)>) -> Result<BatchOutcome, StorageError> {
        (**self).put_batch(items).await
    }

    async fn delete_batch(&self, keys: Vec<String>) -> Result<BatchOutcome, StorageError> {
        (**self).delete_batch(keys).await
    }
}
