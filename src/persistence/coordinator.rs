// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::core::error::StoreError;
use crate::core::state::StoreState;
use crate::core::types::DistanceMetric;
use crate::persistence::medium::{SnapshotMedium, SnapshotSlot};
use crate::persistence::snapshot::{Snapshot, SnapshotManifest};

/// Drives the persist/load protocol over a [`SnapshotMedium`]:
/// stage under a temporary name, re-read and verify, then commit.
pub struct SnapshotCoordinator {
    medium: Arc<dyn SnapshotMedium>,
    persist_lock: Mutex<()>,
}

impl SnapshotCoordinator {
    pub fn new(medium: Arc<dyn SnapshotMedium>) -> Self {
        Self {
            medium,
            persist_lock: Mutex::new(()),
        }
    }

    pub fn medium(&self) -> &Arc<dyn SnapshotMedium> {
        &self.medium
    }

    pub async fn manifest(&self) -> Result<Option<SnapshotManifest>, StoreError> {
        self.medium.manifest(SnapshotSlot::Current).await
    }

    /// Writes `snapshot` as the next generation.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<SnapshotManifest, StoreError> {
        let _guard = self.persist_lock.lock().await;
        self.write_locked(snapshot).await
    }

    /// Caller holds `persist_lock`.
    async fn write_locked(&self, snapshot: &Snapshot) -> Result<SnapshotManifest, StoreError> {
        let bytes = snapshot.to_cbor()?;
        let generation = self
            .medium
            .manifest(SnapshotSlot::Current)
            .await?
            .map(|m| m.generation + 1)
            .unwrap_or(1);

        let staged = self.medium.stage(generation, bytes.clone()).await?;
        let readback = self.medium.read_staged(&staged).await?;
        if readback != bytes {
            return Err(StoreError::CorruptState(format!(
                "staged snapshot {} did not read back intact",
                staged.location
            )));
        }
        let verified = Snapshot::from_cbor(&readback)?;

        let manifest = SnapshotManifest::describe(&verified, generation, staged.location.clone());
        self.medium.commit(&staged, &manifest).await?;

        info!(
            "Persisted snapshot generation {} ({} records) to {}",
            generation,
            manifest.record_count,
            self.medium.describe()
        );
        Ok(manifest)
    }

    /// Reads and verifies the snapshot in `slot`. Missing is `NotFound`.
    pub async fn read(&self, slot: SnapshotSlot) -> Result<Snapshot, StoreError> {
        match self.medium.read(slot).await? {
            Some(bytes) => Snapshot::from_cbor(&bytes),
            None => Err(StoreError::NotFound(format!(
                "{:?} snapshot in {}",
                slot,
                self.medium.describe()
            ))),
        }
    }

    /// Persists `state` if dirty. The snapshot is a copy taken under a read
    /// lock, so concurrent writers land wholly before or after it; the dirty
    /// flag is only cleared if no write landed while it was being written.
    ///
    /// `persist_lock` is held from the copy to `mark_persisted`, so
    /// generations are committed in the order their copies were taken.
    pub async fn persist(&self, state: &RwLock<StoreState>) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;

        let (snapshot, mutations) = {
            let state = state.read().await;
            if !state.is_dirty() {
                debug!("Persist skipped, store is clean");
                return Ok(());
            }
            (state.snapshot()?, state.mutation_count())
        };

        self.write_locked(&snapshot).await?;
        state.write().await.mark_persisted(mutations);
        Ok(())
    }

    /// Replaces `state` with the verified snapshot in `slot`. A snapshot
    /// taken under a different metric, or with a dimension other than the
    /// one `state` already established, is rejected.
    pub async fn restore(
        &self,
        state: &RwLock<StoreState>,
        slot: SnapshotSlot,
        metric: DistanceMetric,
    ) -> Result<(), StoreError> {
        let snapshot = self.read(slot).await?;
        let restored = restore_state(snapshot, metric, state.read().await.dimension())?;

        let count = restored.len();
        *state.write().await = restored;
        info!(
            "Loaded {:?} snapshot with {} records from {}",
            slot,
            count,
            self.medium.describe()
        );
        Ok(())
    }
}

/// Validates a snapshot against the store's fixed configuration and replays
/// it into fresh state.
pub fn restore_state(
    snapshot: Snapshot,
    metric: DistanceMetric,
    established_dimension: Option<usize>,
) -> Result<StoreState, StoreError> {
    if snapshot.metric != metric {
        return Err(StoreError::ConfigurationError(format!(
            "snapshot uses {} metric, store is configured for {}",
            snapshot.metric, metric
        )));
    }
    if let (Some(expected), Some(actual)) = (established_dimension, snapshot.dimension) {
        if expected != actual {
            return Err(StoreError::DimensionMismatch { expected, actual });
        }
    }
    StoreState::from_snapshot(snapshot)
}
