// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::{BackendKind, LocalBackend, RemoteBackend, StoreStats, VectorBackend};
use crate::core::error::StoreError;
use crate::core::types::{Metadata, NewRecord, Record, RecordId, RecordUpdate, SearchHit};
use crate::persistence::snapshot::{Snapshot, SnapshotManifest};
use crate::store::config::StoreConfig;

/// Produces the vector for a piece of text. The store only checks the
/// length of what comes back.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

#[async_trait]
impl<F> Embedder for F
where
    F: Fn(&str) -> Vec<f32> + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self(text))
    }
}

/// Text input for [`VectorStore::add_documents`]; the vector comes from the
/// configured embedder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

pub async fn build_backend(config: &StoreConfig) -> Result<Arc<dyn VectorBackend>, StoreError> {
    config.validate()?;
    let backend: Arc<dyn VectorBackend> = match config.backend {
        BackendKind::Local => {
            Arc::new(LocalBackend::open(&config.path_or_bucket, config.distance_metric).await?)
        }
        BackendKind::Remote => Arc::new(RemoteBackend::connect(config).await?),
    };
    Ok(backend)
}

/// Single entry point over whichever backend is configured.
///
/// Every call holds a read guard on the backend slot for its whole duration,
/// so [`VectorStore::migrate_to`] never swaps backends under a running call.
pub struct VectorStore {
    backend: RwLock<Arc<dyn VectorBackend>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl VectorStore {
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::from_backend(build_backend(&config).await?))
    }

    pub fn from_backend(backend: Arc<dyn VectorBackend>) -> Self {
        Self {
            backend: RwLock::new(backend),
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    pub async fn backend_kind(&self) -> BackendKind {
        self.backend.read().await.kind()
    }

    pub async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError> {
        self.backend.read().await.add(records).await
    }

    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.backend.read().await.search(query, k).await
    }

    pub async fn update(&self, id: &RecordId, update: RecordUpdate) -> Result<bool, StoreError> {
        self.backend.read().await.update(id, update).await
    }

    pub async fn remove(&self, ids: &[RecordId]) -> Result<bool, StoreError> {
        self.backend.read().await.remove(ids).await
    }

    pub async fn get(&self, id: &RecordId) -> Result<Record, StoreError> {
        self.backend.read().await.get(id).await
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        self.backend.read().await.persist().await
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.backend.read().await.load().await
    }

    /// Explicit recovery from the retained previous snapshot. Never called
    /// implicitly by `load`.
    pub async fn load_previous(&self) -> Result<(), StoreError> {
        self.backend.read().await.load_previous().await
    }

    pub async fn export(&self) -> Result<Snapshot, StoreError> {
        self.backend.read().await.export().await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.backend.read().await.stats().await
    }

    pub async fn manifest(&self) -> Result<Option<SnapshotManifest>, StoreError> {
        self.backend.read().await.manifest().await
    }

    fn embedder(&self) -> Result<&Arc<dyn Embedder>, StoreError> {
        self.embedder.as_ref().ok_or_else(|| {
            StoreError::ConfigurationError("no embedder configured for text operations".to_string())
        })
    }

    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<RecordId>, StoreError> {
        let embedder = self.embedder()?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            let vector = embedder.embed(&document.content).await?;
            records.push(NewRecord {
                id: document.id,
                content: document.content,
                metadata: document.metadata,
                vector,
            });
        }
        self.add(records).await
    }

    pub async fn search_text(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, StoreError> {
        let vector = self.embedder()?.embed(query).await?;
        self.search(&vector, k).await
    }

    /// Copies a point-in-time snapshot into a backend built from `config`,
    /// persists it there and switches over. The metric is carried over from
    /// the current backend. On failure the current backend stays in place.
    pub async fn migrate_to(&self, config: StoreConfig) -> Result<StoreStats, StoreError> {
        let mut slot = self.backend.write().await;

        let mut config = config;
        if config.distance_metric != slot.metric() {
            warn!(
                "Migration target requested {} metric, keeping {}",
                config.distance_metric,
                slot.metric()
            );
            config.distance_metric = slot.metric();
        }

        let target = build_backend(&config).await?;
        Self::switch(&mut slot, target).await
    }

    /// Same as [`VectorStore::migrate_to`] for an already constructed
    /// backend, which must use the current metric.
    pub async fn migrate_to_backend(
        &self,
        target: Arc<dyn VectorBackend>,
    ) -> Result<StoreStats, StoreError> {
        let mut slot = self.backend.write().await;
        if target.metric() != slot.metric() {
            return Err(StoreError::ConfigurationError(format!(
                "migration target uses {} metric, store uses {}",
                target.metric(),
                slot.metric()
            )));
        }
        Self::switch(&mut slot, target).await
    }

    async fn switch(
        slot: &mut Arc<dyn VectorBackend>,
        target: Arc<dyn VectorBackend>,
    ) -> Result<StoreStats, StoreError> {
        let snapshot = slot.export().await?;
        target.import(snapshot).await?;
        target.persist().await?;

        let stats = target.stats().await?;
        info!(
            "Migrated {} records from {} backend to {} backend",
            stats.record_count,
            slot.kind(),
            target.kind()
        );
        *slot = target;
        Ok(stats)
    }
}
