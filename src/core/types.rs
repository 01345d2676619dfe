// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::StoreError;
use crate::core::vector_ops;

/// Stable identifier of a record. Assigned at creation when the caller
/// leaves it empty and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        RecordId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed-length hex digest of the id, safe to embed in object keys
    /// regardless of which characters the id itself contains.
    pub fn hash_hex(&self) -> String {
        hex::encode(blake3::hash(self.0.as_bytes()).as_bytes())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// Scalar metadata value. Untagged so JSON callers write plain literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity, in [-1, 1]
    Cosine,
    /// Negative squared Euclidean distance, in (-inf, 0]
    Euclidean,
}

impl DistanceMetric {
    /// Higher is more similar for both metrics.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => vector_ops::cosine_similarity(a, b),
            DistanceMetric::Euclidean => vector_ops::negative_squared_euclidean(a, b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Cosine
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            other => Err(StoreError::ConfigurationError(format!(
                "unknown distance metric '{}', expected cosine or euclidean",
                other
            ))),
        }
    }
}

/// A live record as returned by the store. Always a copy; mutating it has no
/// effect on the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, StoreError> {
        serde_cbor::to_vec(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, StoreError> {
        serde_cbor::from_slice(data).map_err(|e| StoreError::SerializationError(e.to_string()))
    }
}

/// Caller-side input for `add`. Timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

impl NewRecord {
    pub fn new(content: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata: Metadata::new(),
            vector,
        }
    }

    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Replacement fields for `update`. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.metadata.is_none() && self.vector.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: Record,
    pub score: f32,
}
