//! Backend cache introspection and manual reconcile: `/v1/backends/*`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use hcsi_engine::handler::{BackendSnapshot, StorageHandler};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/backends` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backends))
        .route("/{name}", get(show_backend))
        .route("/{name}", axum::routing::delete(delete_backend))
        .route("/{name}/reconcile", post(reconcile_backend))
}

#[derive(Debug, Serialize)]
pub struct BackendSummaryResponse {
    pub backends: Vec<BackendSummary>,
}

#[derive(Debug, Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub storage: String,
    pub available: bool,
    pub pool_count: usize,
}

#[derive(Debug, Serialize)]
pub struct BackendDetailResponse {
    pub name: String,
    pub storage: String,
    pub available: bool,
    #[serde(flatten)]
    pub snapshot: BackendSnapshot,
}

/// List every cached backend.
async fn list_backends(State(state): State<Arc<AppState>>) -> Json<BackendSummaryResponse> {
    let backends = state
        .cache
        .list()
        .await
        .into_iter()
        .map(|b| BackendSummary {
            name: b.name,
            storage: b.storage,
            available: b.available,
            pool_count: b.pools.len(),
        })
        .collect();
    Json(BackendSummaryResponse { backends })
}

/// Show one backend's live plugin-reported capabilities and pool
/// capacities, rebuilding it first if its descriptor generation rotated.
async fn show_backend(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Json<BackendDetailResponse>, AppError> {
    let content_name = state.cache.load(&name).await.map(|b| b.content_name).unwrap_or_default();
    let snapshot = StorageHandler::new(&state.register).collect(&name, &content_name).await?;

    let (storage, available) = state
        .cache
        .load(&name)
        .await
        .map(|b| (b.storage, b.available))
        .unwrap_or_default();
    Ok(Json(BackendDetailResponse { name, storage, available, snapshot }))
}

/// Force a single-backend reconcile, bypassing the descriptor-generation
/// cache check.
async fn reconcile_backend(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    state.register.fetch_and_register_one_backend(&name, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Evict a backend from the cache, logging its plugin out.
async fn delete_backend(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    match state.register.remove_registered_one_backend(&name).await {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::NotFound(format!("backend '{name}' not found"))),
    }
}
