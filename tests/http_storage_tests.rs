// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use mockito::Matcher;
use std::time::Duration;
use vector_store::backend::{RemoteBackend, VectorBackend};
use vector_store::core::types::{NewRecord, RecordId};
use vector_store::storage::{HttpObjectStorage, HttpStorageConfig, ObjectStorage, RetryConfig, StorageError};
use vector_store::{StoreConfig, StoreError};

fn client(endpoint: String, api_key: Option<&str>) -> HttpObjectStorage {
    HttpObjectStorage::new(HttpStorageConfig {
        endpoint,
        bucket: "vectors".to_string(),
        api_key: api_key.map(str::to_string),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_get_put_delete_round_trip() {
    let mut server = mockito::Server::new_async().await;

    let _put = server
        .mock("PUT", "/vectors/docs/records/abc")
        .match_header("content-type", "application/cbor")
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .create_async()
        .await;
    let _get = server
        .mock("GET", "/vectors/docs/records/abc")
        .with_status(200)
        .with_header("content-type", "application/cbor")
        .with_body(vec![1u8, 2, 3])
        .create_async()
        .await;
    let _delete = server
        .mock("DELETE", "/vectors/docs/records/abc")
        .with_status(204)
        .create_async()
        .await;

    let storage = client(server.url(), Some("secret"));
    storage.put("docs/records/abc", vec![1, 2, 3]).await.unwrap();
    assert_eq!(
        storage.get("docs/records/abc").await.unwrap(),
        Some(vec![1, 2, 3])
    );
    storage.delete("docs/records/abc").await.unwrap();
}

#[tokio::test]
async fn test_missing_object_is_none() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/vectors/nothing")
        .with_status(404)
        .create_async()
        .await;

    let storage = client(server.url(), None);
    assert_eq!(storage.get("nothing").await.unwrap(), None);
}

#[tokio::test]
async fn test_list_by_prefix() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/vectors")
        .match_query(Matcher::UrlEncoded("prefix".into(), "docs/records/".into()))
        .with_status(200)
        .with_body(r#"["docs/records/a","docs/records/b"]"#)
        .create_async()
        .await;

    let storage = client(server.url(), None);
    let keys = storage.list("docs/records/").await.unwrap();
    assert_eq!(keys, vec!["docs/records/a", "docs/records/b"]);
}

#[tokio::test]
async fn test_status_codes_map_to_error_classes() {
    let mut server = mockito::Server::new_async().await;
    let _throttled = server
        .mock("GET", "/vectors/busy")
        .with_status(429)
        .create_async()
        .await;
    let _denied = server
        .mock("GET", "/vectors/secret")
        .with_status(403)
        .create_async()
        .await;
    let _broken = server
        .mock("PUT", "/vectors/broken")
        .with_status(502)
        .create_async()
        .await;

    let storage = client(server.url(), None);
    assert!(matches!(
        storage.get("busy").await,
        Err(StorageError::Throttled(_))
    ));
    assert!(matches!(
        storage.get("secret").await,
        Err(StorageError::Unauthorized(_))
    ));
    let err = storage.put("broken", vec![0]).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_batch_reports_item_outcomes() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/vectors/_batch")
        .match_header("content-type", "application/cbor")
        .with_status(200)
        .with_body(
            r#"[
                {"key":"a","status":200},
                {"key":"b","status":429,"error":"slow down"},
                {"key":"c","status":400,"error":"bad key"}
            ]"#,
        )
        .expect(1)
        .create_async()
        .await;

    let storage = client(server.url(), None);
    let outcome = storage
        .put_batch(vec![
            ("a".to_string(), vec![1]),
            ("b".to_string(), vec![2]),
            ("c".to_string(), vec![3]),
        ])
        .await
        .unwrap();

    assert!(outcome[0].is_ok());
    assert!(matches!(outcome[1], Err(StorageError::Throttled(_))));
    assert!(matches!(outcome[2], Err(StorageError::Rejected(_))));
}

#[tokio::test]
async fn test_remote_backend_over_http() {
    let mut server = mockito::Server::new_async().await;
    let _health = server
        .mock("GET", "/health")
        .with_status(200)
        .create_async()
        .await;
    let _pointer = server
        .mock("GET", "/vectors/docs/snapshot/CURRENT")
        .with_status(404)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/vectors/_batch")
        .with_status(200)
        .with_body(r#"[{"key":"x","status":200},{"key":"y","status":201}]"#)
        .expect(1)
        .create_async()
        .await;

    let config = StoreConfig::remote(server.url(), "vectors")
        .with_prefix("docs")
        .with_retry(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        });
    let backend = RemoteBackend::connect(&config).await.unwrap();

    let ids = backend
        .add(vec![
            NewRecord::new("first", vec![1.0, 0.0]).with_id("x"),
            NewRecord::new("second", vec![0.0, 1.0]).with_id("y"),
        ])
        .await
        .unwrap();
    assert_eq!(ids, vec![RecordId::from("x"), RecordId::from("y")]);
    batch.assert_async().await;

    let hits = backend.search(&[0.0, 1.0], 1).await.unwrap();
    assert_eq!(hits[0].record.id, RecordId::from("y"));
}

#[tokio::test]
async fn test_unhealthy_endpoint_fails_connect() {
    let mut server = mockito::Server::new_async().await;
    let _health = server
        .mock("GET", "/health")
        .with_status(401)
        .create_async()
        .await;

    let config = StoreConfig::remote(server.url(), "vectors");
    assert!(matches!(
        RemoteBackend::connect(&config).await,
        Err(StoreError::ConfigurationError(_))
    ));
}
