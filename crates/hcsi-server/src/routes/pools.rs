//! Pool selection dry run: `/v1/pools/select`

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use hcsi_engine::params::ParamBag;
use hcsi_engine::selector::BackendSelector;
use hcsi_engine::topology::AccessibleTopology;
use hcsi_engine::weight::weight_by_free_capacity;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/select", post(select_pool))
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub size_bytes: i64,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub requisite: Vec<HashMap<String, String>>,
    #[serde(default)]
    pub preferred: Vec<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct PoolRef {
    pub backend: String,
    pub pool: String,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub local: PoolRef,
    pub remote: Option<PoolRef>,
}

/// Dry run of the selector (C7): narrows, weights, and (for paired
/// requests) resolves a remote pool — never reserves capacity or writes
/// to the cache, unlike `ProvisioningRouter::create_volume`'s real path.
async fn select_pool(State(state): State<Arc<AppState>>, Json(body): Json<SelectRequest>) -> Result<Json<SelectResponse>, AppError> {
    let selector = BackendSelector::new(&state.cache, &state.register);
    let topology = AccessibleTopology { requisite: body.requisite, preferred: body.preferred };
    let bag = ParamBag::new(&body.parameters);

    let candidates = selector.select_local_pool(body.size_bytes, &bag, &topology).await?;
    let weighted = weight_by_free_capacity(candidates);
    let top = weighted
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Conflict("no available pool".to_owned()))?;

    let remote = selector
        .select_remote_pool(body.size_bytes, &top.backend.name, &bag)
        .await?
        .map(|c| PoolRef { backend: c.backend.name, pool: c.pool.name });

    Ok(Json(SelectResponse {
        local: PoolRef { backend: top.backend.name, pool: top.pool.name },
        remote,
    }))
}
