// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::backend::BackendKind;
use crate::core::error::StoreError;
use crate::core::types::DistanceMetric;
use crate::storage::retry::RetryConfig;

pub const DEFAULT_PATH: &str = "./vector_store_data";
pub const DEFAULT_PREFIX: &str = "vectors";
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Construction-time configuration of a store. `path_or_bucket` is the
/// directory for the local backend and the bucket name for the remote one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub path_or_bucket: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::local(DEFAULT_PATH)
    }
}

impl StoreConfig {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Local,
            path_or_bucket: path.into(),
            endpoint: None,
            api_key: None,
            prefix: default_prefix(),
            distance_metric: DistanceMetric::Cosine,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            retry: RetryConfig::default(),
        }
    }

    pub fn remote(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Remote,
            endpoint: Some(endpoint.into()),
            ..Self::local(bucket)
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.path_or_bucket.trim().is_empty() {
            return Err(config_error(match self.backend {
                BackendKind::Local => "local backend requires a path",
                BackendKind::Remote => "remote backend requires a bucket",
            }));
        }
        if self.max_batch_size == 0 {
            return Err(config_error("max_batch_size must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(config_error("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(config_error("retry.base_delay must not exceed retry.max_delay"));
        }
        if self.retry.operation_timeout.is_zero() {
            return Err(config_error("retry.operation_timeout must be positive"));
        }

        if self.backend == BackendKind::Remote {
            match self.endpoint.as_deref() {
                Some(endpoint)
                    if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {}
                Some(endpoint) => {
                    return Err(StoreError::ConfigurationError(format!(
                        "invalid endpoint '{}': must start with http:// or https://",
                        endpoint
                    )))
                }
                None => return Err(config_error("remote backend requires an endpoint")),
            }
        }
        Ok(())
    }

    /// Reads `VECTOR_STORE_*` variables over the defaults.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = StoreConfig::default();

        if let Some(backend) = lookup("VECTOR_STORE_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(path) = lookup("VECTOR_STORE_PATH") {
            config.path_or_bucket = path;
        }
        config.endpoint = lookup("VECTOR_STORE_ENDPOINT");
        config.api_key = lookup("VECTOR_STORE_API_KEY");
        if let Some(prefix) = lookup("VECTOR_STORE_PREFIX") {
            config.prefix = prefix;
        }
        if let Some(metric) = lookup("VECTOR_STORE_METRIC") {
            config.distance_metric = metric.parse()?;
        }
        if let Some(size) = parse_var(&lookup, "VECTOR_STORE_MAX_BATCH_SIZE")? {
            config.max_batch_size = size;
        }
        if let Some(attempts) = parse_var(&lookup, "VECTOR_STORE_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var(&lookup, "VECTOR_STORE_RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "VECTOR_STORE_RETRY_MAX_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "VECTOR_STORE_TIMEOUT_MS")? {
            config.retry.operation_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        info!(
            "Store configuration: backend={} location={} prefix={} metric={} batch={} retry={}x{:?}..{:?}",
            self.backend,
            self.path_or_bucket,
            self.prefix,
            self.distance_metric,
            self.max_batch_size,
            self.retry.max_attempts,
            self.retry.base_delay,
            self.retry.max_delay
        );
        if let Some(endpoint) = &self.endpoint {
            info!(
                "Remote endpoint: {} (api key {})",
                endpoint,
                if self.api_key.is_some() { "configured" } else { "not configured" }
            );
        }
    }
}

fn config_error(message: &str) -> StoreError {
    StoreError::ConfigurationError(message.to_string())
}

pub(crate) fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            StoreError::ConfigurationError(format!("invalid {} '{}': {}", key, raw, e))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.path_or_bucket, DEFAULT_PATH);
        assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_remote_from_env() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("VECTOR_STORE_BACKEND", "remote"),
            ("VECTOR_STORE_PATH", "embeddings"),
            ("VECTOR_STORE_ENDPOINT", "https://objects.example.com"),
            ("VECTOR_STORE_METRIC", "euclidean"),
            ("VECTOR_STORE_MAX_BATCH_SIZE", "25"),
            ("VECTOR_STORE_RETRY_ATTEMPTS", "5"),
            ("VECTOR_STORE_RETRY_BASE_MS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Remote);
        assert_eq!(config.path_or_bucket, "embeddings");
        assert_eq!(config.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_unparseable_number_is_configuration_error() {
        let err = StoreConfig::from_lookup(lookup(&[("VECTOR_STORE_MAX_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_remote_without_endpoint_is_rejected() {
        let mut config = StoreConfig::remote("http://localhost:9000", "bucket");
        config.endpoint = None;
        assert!(matches!(config.validate(), Err(StoreError::ConfigurationError(_))));

        let config = StoreConfig::remote("ftp://localhost", "bucket");
        assert!(matches!(config.validate(), Err(StoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_inverted_retry_delays_are_rejected() {
        let config = StoreConfig::local("/tmp/x").with_retry(RetryConfig {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        });
        assert!(matches!(config.validate(), Err(StoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = StoreConfig::remote("https://objects.example.com", "b").with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
