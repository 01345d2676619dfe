// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::backend::{BackendKind, StoreStats, VectorBackend};
use crate::core::error::StoreError;
use crate::core::state::StoreState;
use crate::core::types::{DistanceMetric, NewRecord, Record, RecordId, RecordUpdate, SearchHit};
use crate::persistence::coordinator::{restore_state, SnapshotCoordinator};
use crate::persistence::medium::{FileSnapshotMedium, SnapshotSlot};
use crate::persistence::snapshot::{Snapshot, SnapshotManifest};

/// Fully resident backend. Mutations apply under the state write lock and
/// are visible to the next read; snapshots go to files under `dir`.
pub struct LocalBackend {
    dir: PathBuf,
    metric: DistanceMetric,
    state: RwLock<StoreState>,
    coordinator: SnapshotCoordinator,
    write_gate: Mutex<()>,
}

impl LocalBackend {
    pub async fn open(dir: impl Into<PathBuf>, metric: DistanceMetric) -> Result<Self, StoreError> {
        let dir = dir.into();
        if dir.as_os_str().is_empty() {
            return Err(StoreError::ConfigurationError(
                "local backend requires a directory".to_string(),
            ));
        }
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::ConfigurationError(format!("cannot create {}: {}", dir.display(), e))
        })?;

        info!("Opened local vector store at {} ({})", dir.display(), metric);
        Ok(Self {
            coordinator: SnapshotCoordinator::new(Arc::new(FileSnapshotMedium::new(dir.clone()))),
            dir,
            metric,
            state: RwLock::new(StoreState::new(metric)),
            write_gate: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn restore(&self, slot: SnapshotSlot) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.coordinator.restore(&self.state, slot, self.metric).await
    }
}

#[async_trait]
impl VectorBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut state = self.state.write().await;

        let prepared = state.prepare_add(records)?;
        let ids: Vec<RecordId> = prepared.iter().map(|r| r.id.clone()).collect();
        state.apply_add(prepared)?;

        debug!("Added {} records", ids.len());
        Ok(ids)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.state.read().await.search(query, k)
    }

    async fn update(&self, id: &RecordId, update: RecordUpdate) -> Result<bool, StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut state = self.state.write().await;

        let record = state.prepare_update(id, update)?;
        state.apply_update(record)?;
        Ok(true)
    }

    async fn remove(&self, ids: &[RecordId]) -> Result<bool, StoreError> {
        let _gate = self.write_gate.lock().await;
        Ok(self.state.write().await.apply_remove(ids))
    }

    async fn get(&self, id: &RecordId) -> Result<Record, StoreError> {
        self.state.read().await.get(id)
    }

    async fn persist(&self) -> Result<(), StoreError> {
        self.coordinator.persist(&self.state).await
    }

    async fn load(&self) -> Result<(), StoreError> {
        self.restore(SnapshotSlot::Current).await
    }

    async fn load_previous(&self) -> Result<(), StoreError> {
        self.restore(SnapshotSlot::Previous).await
    }

    async fn export(&self) -> Result<Snapshot, StoreError> {
        self.state.read().await.snapshot()
    }

    async fn import(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut state = self.state.write().await;

        let mut imported = restore_state(snapshot, self.metric, state.dimension())?;
        imported.mark_dirty();
        *state = imported;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().await;
        Ok(StoreStats {
            backend: BackendKind::Local,
            record_count: state.len(),
            dimension: state.dimension(),
            metric: self.metric,
            dirty: state.is_dirty(),
        })
    }

    async fn manifest(&self) -> Result<Option<SnapshotManifest>, StoreError> {
        self.coordinator.manifest().await
    }
}
