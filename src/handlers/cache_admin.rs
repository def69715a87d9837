//! Cache Administration Endpoints

use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::middleware::RequestId;

/// GET /cache/stats
#[utoipa::path(
    get,
    path = "/cache/stats",
    responses((status = 200, description = "Result cache counters")),
    tag = "System"
)]
pub async fn cache_stats(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Json<Value> {
    Json(json!({
        "cache": state.gateway.cache_stats(),
        "request_id": request_id.0,
    }))
}

/// DELETE /cache/clear
#[utoipa::path(
    delete,
    path = "/cache/clear",
    responses((status = 200, description = "Cache invalidated")),
    tag = "System"
)]
pub async fn cache_clear(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Json<Value> {
    state.gateway.clear_cache();
    Json(json!({"cleared": true, "request_id": request_id.0}))
}
