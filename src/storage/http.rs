// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::StoreError;
use crate::storage::object::{BatchOutcome, ObjectStorage, StorageError};

#[derive(Debug, Clone, PartialEq)]
pub struct HttpStorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

/// Client for a bucket-style HTTP object store:
/// `GET|PUT|DELETE {endpoint}/{bucket}/{key}`, `GET {endpoint}/{bucket}?prefix=`
/// for listing, `POST {endpoint}/{bucket}/_batch` for batched writes and
/// `GET {endpoint}/health`.
#[derive(Clone)]
pub struct HttpObjectStorage {
    config: HttpStorageConfig,
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStorage")
            .field("base_url", &self.base_url)
            .field("bucket", &self.config.bucket)
            .field("api_key", &self.config.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BatchOperation {
    Put { key: String, data: Vec<u8> },
    Delete { key: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<BatchOperation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchItemResponse {
    pub key: String,
    pub status: u16,
    #[serde(default)]
    pub error: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(config: HttpStorageConfig) -> Result<Self, StoreError> {
        if !config.endpoint.starts_with("http://") && !config.endpoint.starts_with("https://") {
            return Err(StoreError::ConfigurationError(format!(
                "invalid endpoint '{}': must start with http:// or https://",
                config.endpoint
            )));
        }
        if config.bucket.trim().is_empty() {
            return Err(StoreError::ConfigurationError(
                "bucket name is required for the remote backend".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::ConfigurationError(format!("HTTP client: {}", e)))?;
        let base_url = config.endpoint.trim_end_matches('/').to_string();

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.base_url, self.config.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), key.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.header("Authorization", format!("Bearer {}", api_key)),
            None => request,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> StorageError {
        if err.is_timeout() {
            StorageError::Timeout(self.config.request_timeout)
        } else {
            StorageError::NetworkError(err.to_string())
        }
    }

    async fn batch(&self, operations: Vec<BatchOperation>) -> Result<BatchOutcome, StorageError> {
        let expected = operations.len();
        let body = serde_cbor::to_vec(&BatchRequest { operations })
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let response = self
            .authorize(self.client.post(format!("{}/_batch", self.bucket_url())))
            .header("Content-Type", "application/cbor")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "batch"));
        }

        let items: Vec<BatchItemResponse> = response
            .json()
            .await
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        if items.len() != expected {
            return Err(StorageError::Rejected(format!(
                "batch response has {} items, expected {}",
                items.len(),
                expected
            )));
        }

        Ok(items
            .into_iter()
            .map(|item| {
                let status = StatusCode::from_u16(item.status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_success() {
                    Ok(())
                } else {
                    let context = match item.error {
                        Some(error) => format!("{}: {}", item.key, error),
                        None => item.key,
                    };
                    Err(classify_status(status, &context))
                }
            })
            .collect())
    }
}

/// Maps an HTTP status onto the retry taxonomy.
pub fn classify_status(status: StatusCode, context: &str) -> StorageError {
    let message = format!("{} ({})", context, status);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized(message),
        StatusCode::NOT_FOUND => StorageError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            StorageError::Throttled(message)
        }
        StatusCode::REQUEST_TIMEOUT => StorageError::NetworkError(message),
        s if s.is_server_error() => StorageError::NetworkError(message),
        _ => StorageError::Rejected(message),
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let response = self
            .authorize(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
                Ok(Some(bytes.to_vec()))
            }
            s => Err(classify_status(s, &format!("GET {}", key))),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.put(self.object_url(key)))
            .header("Content-Type", "application/cbor")
            .body(data)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_status(response.status(), &format!("PUT {}", key)))
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.delete(self.object_url(key)))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(classify_status(status, &format!("DELETE {}", key)))
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let response = self
            .authorize(self.client.get(self.bucket_url()))
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), &format!("LIST {}", prefix)));
        }

        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.get(format!("{}/health", self.base_url)))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_status(response.status(), "health check"))
        }
    }

    async fn put_batch(&self, items: Vec<(String, Vec<u8>)>) -> Result<BatchOutcome, StorageError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.batch(
            items
                .into_iter()
                .map(|(key, data)| BatchOperation::Put { key, data })
                .collect(),
        )
        .await
    }

    async fn delete_batch(&self, keys: Vec<String>) -> Result<BatchOutcome, StorageError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let outcome = self
            .batch(keys.into_iter().map(|key| BatchOperation::Delete { key }).collect())
            .await?;
        Ok(outcome
            .into_iter()
            .map(|r| match r {
                Err(StorageError::NotFound(_)) => Ok(()),
                other => other,
            })
            .collect())
    }
}
