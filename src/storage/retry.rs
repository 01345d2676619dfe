// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::storage::object::{BatchOutcome, ObjectStorage, StorageError};

// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single attempt. Exceeding it counts as a transient
    /// failure.
    pub operation_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Delay before `attempt` (1-based) without jitter: zero for the first
    /// attempt, then `base_delay * 2^(attempt - 2)` capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31) as u32;
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff delay plus uniform jitter in `[0, delay)`.
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let delay = self.backoff_delay(attempt);
        let nanos = delay.as_nanos().min(u64::MAX as u128) as u64;
        if nanos == 0 {
            return delay;
        }
        delay + Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
    }
}

async fn attempt_with_deadline<Fut, R>(deadline: Duration, fut: Fut) -> Result<R, StorageError>
where
    Fut: Future<Output = Result<R, StorageError>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(deadline)),
    }
}

/// Runs `operation` until it succeeds, fails non-transiently, or runs out of
/// attempts. Exhaustion returns `StorageError::Exhausted` wrapping the last
/// failure.
pub async fn retry_with_backoff<F, Fut, R>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<R, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, StorageError>>,
{
    let max_attempts = config.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match attempt_with_deadline(config.operation_timeout, operation()).await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(StorageError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                })
            }
            Err(e) => {
                let delay = config.jittered_delay(attempt + 1);
                warn!(
                    "{} failed on attempt {}/{}: {}; retrying in {:?}",
                    operation_name, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// Object storage wrapper that routes every call through
/// [`retry_with_backoff`].
pub struct RetryingStorage<T> {
    inner: T,
    config: RetryConfig,
}

impl<T: ObjectStorage> RetryingStorage<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Resubmits only the items that failed transiently. A request-level
    /// failure before any item settled is returned as `Err`; after that it
    /// settles the remaining items.
    async fn retry_batch<F, Fut>(
        &self,
        len: usize,
        operation_name: &str,
        mut submit: F,
    ) -> Result<BatchOutcome, StorageError>
    where
        F: FnMut(Vec<usize>) -> Fut,
        Fut: Future<Output = Result<BatchOutcome, StorageError>>,
    {
        let max_attempts = self.config.attempts();
        let mut outcomes: Vec<Option<Result<(), StorageError>>> = vec![None; len];
        let mut pending: Vec<usize> = (0..len).collect();
        let mut attempt = 0;

        while !pending.is_empty() {
            attempt += 1;
            let exhausted = attempt >= max_attempts;
            let response =
                attempt_with_deadline(self.config.operation_timeout, submit(pending.clone())).await;

            match response {
                Err(e) if !e.is_transient() || exhausted => {
                    let e = if e.is_transient() {
                        StorageError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        }
                    } else {
                        e
                    };
                    if pending.len() == len {
                        return Err(e);
                    }
                    for idx in pending.drain(..) {
                        outcomes[idx] = Some(Err(e.clone()));
                    }
                }
                Err(e) => {
                    let delay = self.config.jittered_delay(attempt + 1);
                    warn!(
                        "{} of {} items failed on attempt {}/{}: {}; retrying in {:?}",
                        operation_name,
                        pending.len(),
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Ok(results) => {
                    if results.len() != pending.len() {
                        return Err(StorageError::Rejected(format!(
                            "{} returned {} outcomes for {} items",
                            operation_name,
                            results.len(),
                            pending.len()
                        )));
                    }

                    let mut retry = Vec::new();
                    for (idx, result) in pending.iter().copied().zip(results) {
                        match result {
                            Err(e) if e.is_transient() && !exhausted => retry.push(idx),
                            Err(e) if e.is_transient() => {
                                outcomes[idx] = Some(Err(StorageError::Exhausted {
                                    attempts: attempt,
                                    last: Box::new(e),
                                }))
                            }
                            other => outcomes[idx] = Some(other),
                        }
                    }
                    pending = retry;

                    if !pending.is_empty() {
                        let delay = self.config.jittered_delay(attempt + 1);
                        warn!(
                            "{}: {} items failed transiently on attempt {}/{}; retrying in {:?}",
                            operation_name,
                            pending.len(),
                            attempt,
                            max_attempts,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| {
                    Err(StorageError::Rejected(format!("{} item was never settled", operation_name)))
                })
            })
            .collect())
    }
}

#[async_trait]
impl<T: ObjectStorage> ObjectStorage for RetryingStorage<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        retry_with_backoff(&self.config, "get", || {
            let inner = &self.inner;
            async move { inner.get(key).await }
        })
        .await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        retry_with_backoff(&self.config, "put", || {
            let inner = &self.inner;
            let data = data.clone();
            async move { inner.put(key, data).await }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        retry_with_backoff(&self.config, "delete", || {
            let inner = &self.inner;
            async move { inner.delete(key).await }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        retry_with_backoff(&self.config, "list", || {
            let inner = &self.inner;
            async move { inner.list(prefix).await }
        })
        .await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        retry_with_backoff(&self.config, "health_check", || {
            let inner = &self.inner;
            async move { inner.health_check().await }
        })
        .await
    }

    async fn put_batch(&self, items: Vec<(String, Vec<u8>)>) -> Result<BatchOutcome, StorageError> {
        let items = &items;
        self.retry_batch(items.len(), "put_batch", |indices| {
            let inner = &self.inner;
            let batch: Vec<(String, Vec<u8>)> = indices.iter().map(|&i| items[i].clone()).collect();
            async move { inner.put_batch(batch).await }
        })
        .await
    }

    async fn delete_batch(&self, keys: Vec<String>) -> Result<BatchOutcome, StorageError> {
        let keys = &keys;
        self.retry_batch(keys.len(), "delete_batch", |indices| {
            let inner = &self.inner;
            let batch: Vec<String> = indices.iter().map(|&i| keys[i].clone()).collect();
            async move { inner.delete_batch(batch).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            operation_timeout: Duration::from_secs(1),
        };

        assert_eq!(config.backoff_delay(1), Duration::ZERO);
        assert_eq!(config.backoff_delay(2), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(400));
        assert_eq!(config.backoff_delay(5), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(60), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_below_double_delay() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = config.jittered_delay(3);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay < Duration::from_millis(400));
        }
    }
}
