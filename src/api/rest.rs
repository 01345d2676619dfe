// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::backend::StoreStats;
use crate::core::error::StoreError;
use crate::core::types::{Metadata, NewRecord, Record, RecordId, RecordUpdate, SearchHit};
use crate::persistence::snapshot::SnapshotManifest;
use crate::store::config::parse_var;
use crate::store::facade::VectorStore;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub max_request_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_request_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl ApiConfig {
    /// Reads `VECTOR_STORE_HOST`, `VECTOR_STORE_PORT` and
    /// `VECTOR_STORE_MAX_REQUEST_SIZE` over the defaults.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("VECTOR_STORE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "VECTOR_STORE_PORT")? {
            config.port = port;
        }
        if let Some(size) = parse_var(&lookup, "VECTOR_STORE_MAX_REQUEST_SIZE")? {
            config.max_request_size = size;
        }
        Ok(config)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VectorStore>,
}

// Request/Response types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRecordsRequest {
    pub records: Vec<NewRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddRecordsResponse {
    pub ids: Vec<RecordId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRecordsRequest {
    pub ids: Vec<RecordId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveRecordsResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateRecordResponse {
    pub updated: bool,
}

/// Either `vector` or `text` must be given; `text` goes through the
/// store's embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub text: Option<String>,
    pub k: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub search_time_ms: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: RecordId,
    pub score: f32,
    pub content: String,
    pub metadata: Metadata,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.record.id,
            score: hit.score,
            content: hit.record.content,
            metadata: hit.record.metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistResponse {
    pub manifest: Option<SnapshotManifest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}

// Error handling
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<Vec<RecordId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<FailedItem>>,
    #[serde(skip)]
    pub status_code: StatusCode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: RecordId,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status_code: StatusCode, error: String) -> Self {
        Self {
            error,
            succeeded: None,
            failed: None,
            status_code,
        }
    }

    pub fn bad_request(error: String) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }
}

impl From<StoreError> for ErrorResponse {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::DimensionMismatch { .. } | StoreError::ConfigurationError(_) => {
                Self::bad_request(message)
            }
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, message),
            StoreError::DuplicateId(_) => Self::new(StatusCode::CONFLICT, message),
            StoreError::StorageUnavailable(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, message),
            StoreError::PartialFailure { succeeded, failed } => Self {
                error: message,
                succeeded: Some(succeeded),
                failed: Some(
                    failed
                        .into_iter()
                        .map(|(id, error)| FailedItem { id, error })
                        .collect(),
                ),
                status_code: StatusCode::MULTI_STATUS,
            },
            other => {
                error!("Request failed: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

pub fn create_app(store: Arc<VectorStore>, config: &ApiConfig) -> Router {
    let state = AppState { store };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        .route("/health", get(health_handler))
        .route("/records", post(add_records).delete(remove_records))
        .route("/records/:id", get(get_record).put(update_record))
        .route("/search", post(search))
        .route("/persist", post(persist))
        .route("/load", post(load))
        .route("/load/previous", post(load_previous))
        .route("/stats", get(stats));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api_v1)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(config.max_request_size))
                .layer(cors),
        )
        .with_state(state)
}

// Handler implementations
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.store.backend_kind().await.to_string(),
    })
}

async fn add_records(
    State(state): State<AppState>,
    Json(request): Json<AddRecordsRequest>,
) -> Result<(StatusCode, Json<AddRecordsResponse>), ErrorResponse> {
    if request.records.is_empty() {
        return Err(ErrorResponse::bad_request("records cannot be empty".to_string()));
    }
    let ids = state.store.add(request.records).await?;
    info!("Stored {} records", ids.len());
    Ok((StatusCode::CREATED, Json(AddRecordsResponse { ids })))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, ErrorResponse> {
    Ok(Json(state.store.get(&RecordId::from(id)).await?))
}

async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<RecordUpdate>,
) -> Result<Json<UpdateRecordResponse>, ErrorResponse> {
    if update.is_empty() {
        return Err(ErrorResponse::bad_request(
            "update must set content, metadata or vector".to_string(),
        ));
    }
    let updated = state.store.update(&RecordId::from(id), update).await?;
    Ok(Json(UpdateRecordResponse { updated }))
}

async fn remove_records(
    State(state): State<AppState>,
    Json(request): Json<RemoveRecordsRequest>,
) -> Result<Json<RemoveRecordsResponse>, ErrorResponse> {
    let removed = state.store.remove(&request.ids).await?;
    Ok(Json(RemoveRecordsResponse { removed }))
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ErrorResponse> {
    let start_time = std::time::Instant::now();

    let hits = match (&request.vector, &request.text) {
        (Some(vector), _) => state.store.search(vector, request.k).await?,
        (None, Some(text)) => state.store.search_text(text, request.k).await?,
        (None, None) => {
            return Err(ErrorResponse::bad_request(
                "search needs a vector or text".to_string(),
            ))
        }
    };

    Ok(Json(SearchResponse {
        results: hits.into_iter().map(SearchResult::from).collect(),
        search_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
    }))
}

async fn persist(State(state): State<AppState>) -> Result<Json<PersistResponse>, ErrorResponse> {
    state.store.persist().await?;
    Ok(Json(PersistResponse {
        manifest: state.store.manifest().await?,
    }))
}

async fn load(State(state): State<AppState>) -> Result<Json<StoreStats>, ErrorResponse> {
    state.store.load().await?;
    Ok(Json(state.store.stats().await?))
}

async fn load_previous(State(state): State<AppState>) -> Result<Json<StoreStats>, ErrorResponse> {
    state.store.load_previous().await?;
    Ok(Json(state.store.stats().await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StoreStats>, ErrorResponse> {
    Ok(Json(state.store.stats().await?))
}
