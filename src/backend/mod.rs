// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! The storage contract both backends implement. The façade picks one at
//! construction from configuration and only ever talks to it through
//! [`VectorBackend`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::StoreError;
use crate::core::types::{DistanceMetric, NewRecord, Record, RecordId, RecordUpdate, SearchHit};
use crate::persistence::snapshot::{Snapshot, SnapshotManifest};

pub mod local;
pub mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Local
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(StoreError::ConfigurationError(format!(
                "unknown backend '{}', expected local or remote",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub backend: BackendKind,
    pub record_count: usize,
    pub dimension: Option<usize>,
    pub metric: DistanceMetric,
    pub dirty: bool,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn metric(&self) -> DistanceMetric;

    /// Inserts new records and returns their ids in input order.
    async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError>;

    /// Up to `k` hits by descending score, ties by ascending id.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError>;

    async fn update(&self, id: &RecordId, update: RecordUpdate) -> Result<bool, StoreError>;

    /// Absent ids are ignored. Returns whether anything was removed.
    async fn remove(&self, ids: &[RecordId]) -> Result<bool, StoreError>;

    async fn get(&self, id: &RecordId) -> Result<Record, StoreError>;

    /// No-op when nothing changed since the last successful persist.
    async fn persist(&self) -> Result<(), StoreError>;

    /// Replaces in-memory state with the committed snapshot.
    async fn load(&self) -> Result<(), StoreError>;

    /// Replaces in-memory state with the retained previous snapshot.
    async fn load_previous(&self) -> Result<(), StoreError>;

    /// Point-in-time copy of the full state.
    async fn export(&self) -> Result<Snapshot, StoreError>;

    /// Replaces in-memory state with `snapshot` and marks it dirty.
    async fn import(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    async fn manifest(&self) -> Result<Option<SnapshotManifest>, StoreError>;
}
