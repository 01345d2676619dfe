// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-process object store with failure injection. Backs the remote backend
//! in tests and lets callers simulate throttling, timeouts, latency and
//! per-key failures.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::storage::object::{BatchOutcome, ObjectStorage, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Throttled,
    Network,
    Unauthorized,
}

impl FailureKind {
    fn to_error(self, target: &str) -> StorageError {
        match self {
            FailureKind::Timeout => StorageError::Timeout(Duration::from_millis(1)),
            FailureKind::Throttled => StorageError::Throttled(format!("slow down: {}", target)),
            FailureKind::Network => StorageError::NetworkError(format!("connection reset: {}", target)),
            FailureKind::Unauthorized => StorageError::Unauthorized(format!("denied: {}", target)),
        }
    }
}

#[derive(Default)]
struct Inner {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    scripted: Mutex<VecDeque<FailureKind>>,
    failing_keys: RwLock<HashMap<String, FailureKind>>,
    latency: RwLock<Option<Duration>>,
    requests: AtomicUsize,
    batch_requests: AtomicUsize,
}

/// Cloning shares the underlying data, so a test can keep a handle while a
/// backend owns another.
#[derive(Clone, Default)]
pub struct MemoryObjectStorage {
    inner: Arc<Inner>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` requests fail with `kind`.
    pub async fn fail_next(&self, count: usize, kind: FailureKind) {
        let mut scripted = self.inner.scripted.lock().await;
        scripted.extend(std::iter::repeat(kind).take(count));
    }

    /// Every request touching `key` fails with `kind` until cleared.
    pub async fn fail_key(&self, key: &str, kind: FailureKind) {
        self.inner
            .failing_keys
            .write()
            .await
            .insert(key.to_string(), kind);
    }

    pub async fn clear_failures(&self) {
        self.inner.scripted.lock().await.clear();
        self.inner.failing_keys.write().await.clear();
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write().await = latency;
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    pub fn batch_request_count(&self) -> usize {
        self.inner.batch_requests.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.data.read().await.keys().cloned().collect()
    }

    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.data.read().await.get(key).cloned()
    }

    /// Writes without counting a request or consulting injected failures.
    pub async fn insert_raw(&self, key: &str, data: Vec<u8>) {
        self.inner.data.write().await.insert(key.to_string(), data);
    }

    async fn begin_request(&self, target: &str) -> Result<(), StorageError> {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);

        let latency = *self.inner.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match self.inner.scripted.lock().await.pop_front() {
            Some(kind) => Err(kind.to_error(target)),
            None => Ok(()),
        }
    }

    async fn check_key(&self, key: &str) -> Result<(), StorageError> {
        match self.inner.failing_keys.read().await.get(key) {
            Some(kind) => Err(kind.to_error(key)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.begin_request(key).await?;
        self.check_key(key).await?;
        Ok(self.inner.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.begin_request(key).await?;
        self.check_key(key).await?;
        self.inner.data.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.begin_request(key).await?;
        self.check_key(key).await?;
        self.inner.data.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.begin_request(prefix).await?;
        let data = self.inner.data.read().await;
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.begin_request("health").await
    }

    async fn put_batch(&self, items: Vec<(String, Vec<u8>)>) -> Result<BatchOutcome, StorageError> {
        self.inner.batch_requests.fetch_add(1, Ordering::SeqCst);
        self.begin_request("batch").await?;

        let mut results = Vec::with_capacity(items.len());
        for (key, data) in items {
            let result = match self.check_key(&key).await {
                Ok(()) => {
                    self.inner.data.write().await.insert(key, data);
                    Ok(())
                }
                Err(e) => Err(e),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn delete_batch(&self, keys: Vec<String>) -> Result<BatchOutcome, StorageError> {
        self.inner.batch_requests.fetch_add(1, Ordering::SeqCst);
        self.begin_request("batch").await?;

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let result = match self.check_key(&key).await {
                Ok(()) => {
                    self.inner.data.write().await.remove(&key);
                    Ok(())
                }
                Err(e) => Err(e),
            };
            results.push(result);
        }
        Ok(results)
    }
}
