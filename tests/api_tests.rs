// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use vector_store::api::rest::*;
use vector_store::{StoreConfig, VectorStore};

async fn create_test_server(dir: &TempDir) -> TestServer {
    let store = VectorStore::open(StoreConfig::local(dir.path().to_string_lossy()))
        .await
        .unwrap()
        .with_embedder(|text: &str| vec![text.len() as f32, 1.0]);
    let app = create_app(Arc::new(store), &ApiConfig::default());
    TestServer::new(app).unwrap()
}

async fn seed(server: &TestServer) {
    let response = server
        .post("/api/v1/records")
        .json(&json!({
            "records": [
                {"id": "a", "content": "east", "vector": [1.0, 0.0]},
                {"id": "b", "content": "north", "vector": [0.0, 1.0]},
                {"id": "c", "content": "mostly east", "vector": [0.9, 0.1], "metadata": {"lang": "en"}}
            ]
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

#[cfg(test)]
mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoints() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;

        for path in ["/health", "/api/v1/health"] {
            let response = server.get(path).await;
            response.assert_status(StatusCode::OK);
            let json: serde_json::Value = response.json();
            assert_eq!(json["status"], "healthy");
            assert_eq!(json["backend"], "local");
            assert!(json["version"].is_string());
        }
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;

        let response = server
            .get("/health")
            .add_header(
                HeaderName::from_static("origin"),
                HeaderValue::from_static("http://localhost:3000"),
            )
            .await;
        response.assert_status(StatusCode::OK);
        assert!(response.headers().get("access-control-allow-origin").is_some());
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_returns_ids() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;

        let response = server
            .post("/api/v1/records")
            .json(&json!({"records": [{"content": "anonymous", "vector": [0.5, 0.5]}]}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let json: serde_json::Value = response.json();
        assert_eq!(json["ids"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_record() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        seed(&server).await;

        let response = server.get("/api/v1/records/c").await;
        response.assert_status(StatusCode::OK);
        let json: serde_json::Value = response.json();
        assert_eq!(json["content"], "mostly east");
        assert_eq!(json["metadata"]["lang"], "en");
        assert!(json["created_at"].is_string());

        server
            .get("/api/v1/records/missing")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        seed(&server).await;

        let duplicate = server
            .post("/api/v1/records")
            .json(&json!({"records": [{"id": "a", "content": "again", "vector": [1.0, 0.0]}]}))
            .await;
        duplicate.assert_status(StatusCode::CONFLICT);

        let mismatch = server
            .post("/api/v1/records")
            .json(&json!({"records": [{"content": "wide", "vector": [1.0, 0.0, 0.0]}]}))
            .await;
        mismatch.assert_status(StatusCode::BAD_REQUEST);
        let json: serde_json::Value = mismatch.json();
        assert!(json["error"].as_str().unwrap().contains("Dimension mismatch"));

        server
            .post("/api/v1/records")
            .json(&json!({"records": []}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        seed(&server).await;

        let response = server
            .put("/api/v1/records/b")
            .json(&json!({"content": "up north"}))
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<serde_json::Value>()["updated"], true);

        server
            .put("/api/v1/records/b")
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .put("/api/v1/records/zzz")
            .json(&json!({"content": "x"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let removed = server
            .delete("/api/v1/records")
            .json(&json!({"ids": ["b", "unknown"]}))
            .await;
        removed.assert_status(StatusCode::OK);
        assert_eq!(removed.json::<serde_json::Value>()["removed"], true);

        let again = server
            .delete("/api/v1/records")
            .json(&json!({"ids": ["b"]}))
            .await;
        assert_eq!(again.json::<serde_json::Value>()["removed"], false);
    }
}

#[cfg(test)]
mod search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_by_vector_is_ordered() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        seed(&server).await;

        let response = server
            .post("/api/v1/search")
            .json(&json!({"vector": [1.0, 0.0], "k": 2}))
            .await;
        response.assert_status(StatusCode::OK);

        let json: serde_json::Value = response.json();
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], "a");
        assert_eq!(results[1]["id"], "c");
        assert!(results[0]["score"].as_f64().unwrap() >= results[1]["score"].as_f64().unwrap());
        assert!(json["search_time_ms"].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_search_by_text() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        server
            .post("/api/v1/records")
            .json(&json!({
                "records": [
                    {"id": "short", "content": "ab", "vector": [2.0, 1.0]},
                    {"id": "long", "content": "abcdefghij", "vector": [10.0, 1.0]}
                ]
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/api/v1/search")
            .json(&json!({"text": "xy", "k": 1}))
            .await;
        response.assert_status(StatusCode::OK);
        let json: serde_json::Value = response.json();
        assert_eq!(json["results"][0]["id"], "short");
    }

    #[tokio::test]
    async fn test_search_needs_vector_or_text() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;

        server
            .post("/api/v1/search")
            .json(&json!({"k": 3}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

#[cfg(test)]
mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_then_load_in_fresh_server() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        seed(&server).await;

        let response = server.post("/api/v1/persist").await;
        response.assert_status(StatusCode::OK);
        let json: serde_json::Value = response.json();
        assert_eq!(json["manifest"]["generation"], 1);
        assert_eq!(json["manifest"]["record_count"], 3);

        let fresh = create_test_server(&dir).await;
        let loaded = fresh.post("/api/v1/load").await;
        loaded.assert_status(StatusCode::OK);
        let stats: serde_json::Value = loaded.json();
        assert_eq!(stats["record_count"], 3);
        assert_eq!(stats["dirty"], false);

        fresh
            .get("/api/v1/records/a")
            .await
            .assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_load_without_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;

        server
            .post("/api/v1/load")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .post("/api/v1/load/previous")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_report_dirty_state() {
        let dir = TempDir::new().unwrap();
        let server = create_test_server(&dir).await;
        seed(&server).await;

        let stats: serde_json::Value = server.get("/api/v1/stats").await.json();
        assert_eq!(stats["backend"], "local");
        assert_eq!(stats["dimension"], 2);
        assert_eq!(stats["metric"], "cosine");
        assert_eq!(stats["dirty"], true);
    }
}
