// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use tempfile::TempDir;
use vector_store::backend::{BackendKind, LocalBackend, RemoteBackend, VectorBackend};
use vector_store::core::types::{DistanceMetric, NewRecord, RecordId, RecordUpdate};
use vector_store::storage::{FailureKind, MemoryObjectStorage, RetryConfig};
use vector_store::{Document, StoreConfig, StoreError, VectorStore};

/// Maps text to a 3-dim vector by counting vowels, consonants and spaces.
fn letter_embedder(text: &str) -> Vec<f32> {
    let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count() as f32;
    let spaces = text.chars().filter(|c| c.is_whitespace()).count() as f32;
    let others = text.chars().count() as f32 - vowels - spaces;
    vec![vowels, others, spaces]
}

async fn local_store(dir: &TempDir) -> VectorStore {
    VectorStore::open(StoreConfig::local(dir.path().to_string_lossy()))
        .await
        .unwrap()
}

async fn memory_remote(storage: &MemoryObjectStorage, metric: DistanceMetric) -> Arc<dyn VectorBackend> {
    let backend = RemoteBackend::with_storage(
        storage.clone(),
        "migrated",
        metric,
        10,
        RetryConfig::default(),
    )
    .await
    .unwrap();
    Arc::new(backend)
}

#[cfg(test)]
mod facade_tests {
    use super::*;

    #[tokio::test]
    async fn test_open_local_from_config() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        assert_eq!(store.backend_kind().await, BackendKind::Local);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 0);
        assert_eq!(stats.dimension, None);
        assert_eq!(stats.metric, DistanceMetric::Cosine);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = StoreConfig::local("").with_max_batch_size(0);
        assert!(matches!(
            VectorStore::open(config).await,
            Err(StoreError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_pass_through() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        store
            .add(vec![
                NewRecord::new("east", vec![1.0, 0.0]).with_id("a"),
                NewRecord::new("north", vec![0.0, 1.0]).with_id("b"),
            ])
            .await
            .unwrap();
        assert!(store
            .update(&RecordId::from("b"), RecordUpdate::new().content("up"))
            .await
            .unwrap());
        assert_eq!(store.get(&RecordId::from("b")).await.unwrap().content, "up");

        assert!(store.remove(&[RecordId::from("a")]).await.unwrap());
        let hits = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, RecordId::from("b"));
    }

    #[tokio::test]
    async fn test_round_trip_through_fresh_store() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        store
            .add(vec![NewRecord::new("kept", vec![0.3, 0.4]).with_id("k")])
            .await
            .unwrap();
        store.persist().await.unwrap();
        let manifest = store.manifest().await.unwrap().unwrap();
        assert_eq!(manifest.generation, 1);

        let fresh = local_store(&dir).await;
        fresh.load().await.unwrap();
        assert_eq!(
            fresh.get(&RecordId::from("k")).await.unwrap(),
            store.get(&RecordId::from("k")).await.unwrap()
        );
    }
}

#[cfg(test)]
mod embedder_tests {
    use super::*;

    #[tokio::test]
    async fn test_documents_are_embedded_and_searchable() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await.with_embedder(letter_embedder);

        let ids = store
            .add_documents(vec![
                Document::new("aaaa").with_id("vowels"),
                Document::new("bcdfg").with_id("consonants"),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let hits = store.search_text("eeee", 1).await.unwrap();
        assert_eq!(hits[0].record.id, RecordId::from("vowels"));
        assert_eq!(hits[0].record.content, "aaaa");
    }

    #[tokio::test]
    async fn test_embedder_dimension_is_checked() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await.with_embedder(letter_embedder);
        store
            .add(vec![NewRecord::new("2d", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(matches!(
            store.add_documents(vec![Document::new("three dims")]).await,
            Err(StoreError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }
}

#[cfg(test)]
mod migration_tests {
    use super::*;

    #[tokio::test]
    async fn test_local_to_remote_migration() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        store
            .add(vec![
                NewRecord::new("east", vec![1.0, 0.0]).with_id("a"),
                NewRecord::new("north", vec![0.0, 1.0]).with_id("b"),
            ])
            .await
            .unwrap();
        store.remove(&[RecordId::from("b")]).await.unwrap();
        let before = store.get(&RecordId::from("a")).await.unwrap();

        let storage = MemoryObjectStorage::new();
        let target = memory_remote(&storage, DistanceMetric::Cosine).await;
        let stats = store.migrate_to_backend(target).await.unwrap();

        assert_eq!(stats.backend, BackendKind::Remote);
        assert_eq!(stats.record_count, 1);
        assert!(!stats.dirty);
        assert_eq!(store.backend_kind().await, BackendKind::Remote);
        assert_eq!(store.get(&RecordId::from("a")).await.unwrap(), before);

        // Retired ids travel with the snapshot.
        assert!(matches!(
            store
                .add(vec![NewRecord::new("again", vec![0.0, 1.0]).with_id("b")])
                .await,
            Err(StoreError::DuplicateId(_))
        ));

        // The target was persisted, so a fresh reader sees the data.
        let reader = memory_remote(&storage, DistanceMetric::Cosine).await;
        assert_eq!(reader.stats().await.unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_remote_to_local_migration_by_config() {
        let storage = MemoryObjectStorage::new();
        let store = VectorStore::from_backend(memory_remote(&storage, DistanceMetric::Euclidean).await);
        store
            .add(vec![NewRecord::new("p", vec![2.0, 2.0]).with_id("p")])
            .await
            .unwrap();

        let dir = TempDir::new().unwrap();
        // Metric comes from the running store, not from the target config.
        let config = StoreConfig::local(dir.path().to_string_lossy()).with_metric(DistanceMetric::Cosine);
        let stats = store.migrate_to(config).await.unwrap();
        assert_eq!(stats.backend, BackendKind::Local);
        assert_eq!(stats.metric, DistanceMetric::Euclidean);

        let reopened = LocalBackend::open(dir.path(), DistanceMetric::Euclidean)
            .await
            .unwrap();
        reopened.load().await.unwrap();
        assert!(reopened.get(&RecordId::from("p")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_current_backend() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        store
            .add(vec![NewRecord::new("stay", vec![1.0, 1.0]).with_id("s")])
            .await
            .unwrap();

        let storage = MemoryObjectStorage::new();
        let target = memory_remote(&storage, DistanceMetric::Cosine).await;
        storage.fail_next(100, FailureKind::Unauthorized).await;

        assert!(store.migrate_to_backend(target).await.is_err());
        assert_eq!(store.backend_kind().await, BackendKind::Local);
        assert!(store.get(&RecordId::from("s")).await.is_ok());
    }

    #[tokio::test]
    async fn test_migration_rejects_other_metric() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        let storage = MemoryObjectStorage::new();
        let target = memory_remote(&storage, DistanceMetric::Euclidean).await;

        assert!(matches!(
            store.migrate_to_backend(target).await,
            Err(StoreError::ConfigurationError(_))
        ));
    }
}
