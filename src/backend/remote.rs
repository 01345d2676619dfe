// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Backend over a key/object store.
//!
//! The searchable structure is always the in-memory index. Record objects are
//! written to `{prefix}/records/{blake3(id)}` as mutations happen, in batches
//! of at most `max_batch_size`, and the in-memory state only takes the items
//! the store acknowledged. The full snapshot lives under `{prefix}/snapshot/`
//! and is pulled into memory on first use.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backend::{BackendKind, StoreStats, VectorBackend};
use crate::core::error::StoreError;
use crate::core::state::StoreState;
use crate::core::types::{DistanceMetric, NewRecord, Record, RecordId, RecordUpdate, SearchHit};
use crate::persistence::coordinator::{restore_state, SnapshotCoordinator};
use crate::persistence::medium::{ObjectSnapshotMedium, SnapshotSlot};
use crate::persistence::snapshot::{Snapshot, SnapshotManifest};
use crate::storage::http::{HttpObjectStorage, HttpStorageConfig};
use crate::storage::object::{BatchOutcome, ObjectStorage, StorageError};
use crate::storage::retry::{RetryConfig, RetryingStorage};
use crate::store::config::StoreConfig;

pub struct RemoteBackend {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
    metric: DistanceMetric,
    max_batch_size: usize,
    state: RwLock<StoreState>,
    coordinator: SnapshotCoordinator,
    write_gate: Mutex<()>,
    hydrated: AtomicBool,
}

impl RemoteBackend {
    /// Builds the HTTP client from `config` and verifies the endpoint is
    /// reachable before returning.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            StoreError::ConfigurationError("remote backend requires an endpoint".to_string())
        })?;
        let client = HttpObjectStorage::new(HttpStorageConfig {
            endpoint,
            bucket: config.path_or_bucket.clone(),
            api_key: config.api_key.clone(),
            request_timeout: config.retry.operation_timeout,
        })?;

        Self::with_storage(
            client,
            &config.prefix,
            config.distance_metric,
            config.max_batch_size,
            config.retry.clone(),
        )
        .await
    }

    /// Wraps `storage` in the retry layer and runs the credential check.
    pub async fn with_storage<S>(
        storage: S,
        prefix: &str,
        metric: DistanceMetric,
        max_batch_size: usize,
        retry: RetryConfig,
    ) -> Result<Self, StoreError>
    where
        S: ObjectStorage + 'static,
    {
        if max_batch_size == 0 {
            return Err(StoreError::ConfigurationError(
                "max_batch_size must be at least 1".to_string(),
            ));
        }

        let storage: Arc<dyn ObjectStorage> = Arc::new(RetryingStorage::new(storage, retry));
        storage.health_check().await.map_err(|e| {
            StoreError::ConfigurationError(format!("remote object store is not reachable: {}", e))
        })?;

        let prefix = prefix.trim_matches('/').to_string();
        let medium = ObjectSnapshotMedium::new(storage.clone(), prefix.clone());

        info!(
            "Connected remote vector store at prefix '{}' ({}, batch size {})",
            prefix, metric, max_batch_size
        );
        Ok(Self {
            storage,
            coordinator: SnapshotCoordinator::new(Arc::new(medium)),
            prefix,
            metric,
            max_batch_size,
            state: RwLock::new(StoreState::new(metric)),
            write_gate: Mutex::new(()),
            hydrated: AtomicBool::new(false),
        })
    }

    pub fn record_key(&self, id: &RecordId) -> String {
        format!("{}/records/{}", self.prefix, id.hash_hex())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Pulls the committed snapshot into memory once per instance. A missing
    /// snapshot means an empty store.
    async fn ensure_hydrated(&self) -> Result<(), StoreError> {
        if self.hydrated.load(Ordering::Acquire) {
            return Ok(());
        }
        let _gate = self.write_gate.lock().await;
        if self.hydrated.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.coordinator.read(SnapshotSlot::Current).await {
            Ok(snapshot) => {
                let restored = restore_state(snapshot, self.metric, None)?;
                info!("Hydrated {} records from remote snapshot", restored.len());
                *self.state.write().await = restored;
            }
            Err(StoreError::NotFound(_)) => {
                debug!("No remote snapshot under '{}', starting empty", self.prefix);
            }
            Err(e) => return Err(e),
        }

        self.hydrated.store(true, Ordering::Release);
        Ok(())
    }

    async fn restore(&self, slot: SnapshotSlot) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.coordinator.restore(&self.state, slot, self.metric).await?;
        self.hydrated.store(true, Ordering::Release);
        Ok(())
    }

    /// Writes record objects chunk by chunk. Once a whole request fails the
    /// remaining chunks are not attempted and report the same error.
    async fn put_records(&self, records: &[Record]) -> Result<BatchOutcome, StoreError> {
        let mut outcomes = Vec::with_capacity(records.len());
        let mut aborted: Option<StorageError> = None;

        for chunk in records.chunks(self.max_batch_size) {
            if let Some(e) = &aborted {
                outcomes.extend(chunk.iter().map(|_| Err(e.clone())));
                continue;
            }
            let items = chunk
                .iter()
                .map(|r| r.to_cbor().map(|bytes| (self.record_key(&r.id), bytes)))
                .collect::<Result<Vec<_>, StoreError>>()?;

            match self.storage.put_batch(items).await {
                Ok(results) => outcomes.extend(results),
                Err(e) => {
                    outcomes.extend(chunk.iter().map(|_| Err(e.clone())));
                    aborted = Some(e);
                }
            }
        }
        Ok(outcomes)
    }

    async fn delete_records(&self, ids: &[RecordId]) -> BatchOutcome {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut aborted: Option<StorageError> = None;

        for chunk in ids.chunks(self.max_batch_size) {
            if let Some(e) = &aborted {
                outcomes.extend(chunk.iter().map(|_| Err(e.clone())));
                continue;
            }
            let keys = chunk.iter().map(|id| self.record_key(id)).collect();

            match self.storage.delete_batch(keys).await {
                Ok(results) => outcomes.extend(results),
                Err(e) => {
                    outcomes.extend(chunk.iter().map(|_| Err(e.clone())));
                    aborted = Some(e);
                }
            }
        }
        outcomes
    }
}

struct Settled {
    succeeded: Vec<RecordId>,
    failed: Vec<(RecordId, StorageError)>,
}

impl Settled {
    fn new(ids: impl IntoIterator<Item = RecordId>, outcomes: BatchOutcome) -> Self {
        let mut settled = Settled {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (id, outcome) in ids.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => settled.succeeded.push(id),
                Err(e) => settled.failed.push((id, e)),
            }
        }
        settled
    }

    /// Nothing failed: `Ok`. Nothing succeeded: the first failure, so a dead
    /// store surfaces as `StorageUnavailable`. Otherwise `PartialFailure`.
    fn into_result(self, operation: &str) -> Result<(), StoreError> {
        if self.failed.is_empty() {
            return Ok(());
        }
        if self.succeeded.is_empty() {
            let (_, first) = self.failed.into_iter().next().ok_or_else(|| {
                StoreError::CorruptState(format!("{} settled without outcomes", operation))
            })?;
            return Err(first.into());
        }

        warn!(
            "{} partially applied: {} succeeded, {} failed",
            operation,
            self.succeeded.len(),
            self.failed.len()
        );
        Err(StoreError::PartialFailure {
            succeeded: self.succeeded,
            failed: self
                .failed
                .into_iter()
                .map(|(id, e)| (id, e.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl VectorBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError> {
        self.ensure_hydrated().await?;
        let _gate = self.write_gate.lock().await;

        let prepared = self.state.read().await.prepare_add(records)?;
        let ids: Vec<RecordId> = prepared.iter().map(|r| r.id.clone()).collect();
        let outcomes = self.put_records(&prepared).await?;

        let stored: Vec<Record> = prepared
            .into_iter()
            .zip(outcomes.iter())
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(record, _)| record)
            .collect();
        self.state.write().await.apply_add(stored)?;

        Settled::new(ids.iter().cloned(), outcomes).into_result("add")?;
        debug!("Added {} records under '{}'", ids.len(), self.prefix);
        Ok(ids)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.ensure_hydrated().await?;
        self.state.read().await.search(query, k)
    }

    async fn update(&self, id: &RecordId, update: RecordUpdate) -> Result<bool, StoreError> {
        self.ensure_hydrated().await?;
        let _gate = self.write_gate.lock().await;

        let record = self.state.read().await.prepare_update(id, update)?;
        self.storage
            .put(&self.record_key(id), record.to_cbor()?)
            .await?;
        self.state.write().await.apply_update(record)?;
        Ok(true)
    }

    async fn remove(&self, ids: &[RecordId]) -> Result<bool, StoreError> {
        self.ensure_hydrated().await?;
        let _gate = self.write_gate.lock().await;

        let live = self.state.read().await.live_ids(ids);
        if live.is_empty() {
            return Ok(false);
        }

        let outcomes = self.delete_records(&live).await;
        let settled = Settled::new(live, outcomes);
        self.state.write().await.apply_remove(&settled.succeeded);

        settled.into_result("remove")?;
        Ok(true)
    }

    async fn get(&self, id: &RecordId) -> Result<Record, StoreError> {
        self.ensure_hydrated().await?;
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
        self.ensure_hydrated().await?;
        self.state.read().await.snapshot()
    }

    /// Writes every record object first; state is only replaced if all of
    /// them were stored.
    async fn import(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.ensure_hydrated().await?;
        let _gate = self.write_gate.lock().await;

        let established = self.state.read().await.dimension();
        let mut imported = restore_state(snapshot.clone(), self.metric, established)?;

        let outcomes = self.put_records(&snapshot.records).await?;
        let ids = snapshot.records.iter().map(|r| r.id.clone());
        let settled = Settled::new(ids, outcomes);
        if !settled.failed.is_empty() {
            return settled.into_result("import");
        }

        imported.mark_dirty();
        *self.state.write().await = imported;
        info!("Imported {} records under '{}'", snapshot.record_count(), self.prefix);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.ensure_hydrated().await?;
        let state = self.state.read().await;
        Ok(StoreStats {
            backend: BackendKind::Remote,
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
