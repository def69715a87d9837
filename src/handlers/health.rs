//! Health Endpoint

use axum::{Extension, Json, extract::State};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;
use crate::middleware::RequestId;

/// GET /health
///
/// Probes the warehouse and reports pool/cache counters. Degraded (probe
/// failure) still answers 200 so orchestrators can read the detail; hard
/// dependency loss shows up as `warehouse: "unhealthy"`.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health with pool and cache counters")
    ),
    tag = "System"
)]
pub async fn health(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Json<serde_json::Value> {
    let warehouse = match state.gateway.probe().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(kind = e.kind.as_str(), detail = %e.detail, "warehouse probe failed");
            "unhealthy"
        },
    };

    Json(json!({
        "status": if warehouse == "healthy" { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "warehouse": warehouse,
        "pool": state.gateway.pool_status(),
        "cache": state.gateway.cache_stats(),
        "datasets": state.catalog.dataset_count(),
        "data_version": state.catalog.data_version(),
        "request_id": request_id.0,
    }))
}
