// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod api;
pub mod backend;
pub mod core;
pub mod persistence;
pub mod storage;
pub mod store;

pub use crate::backend::{BackendKind, LocalBackend, RemoteBackend, StoreStats, VectorBackend};
pub use crate::core::{
    DistanceMetric, Metadata, MetadataValue, NewRecord, Record, RecordId, RecordUpdate, SearchHit,
    StoreError,
};
pub use crate::persistence::{Snapshot, SnapshotManifest};
pub use crate::storage::{ObjectStorage, RetryConfig, StorageError};
pub use crate::store::{Document, Embedder, StoreConfig, VectorStore};
