//! Quality Endpoints

use axum::{Extension, Json, extract::State};
use serde_json::Value;
use std::sync::Arc;

use super::call_tool;
use crate::AppState;
use crate::middleware::RequestId;
use crate::utils::ApiResult;

/// POST /get_quality_filtered_data
#[utoipa::path(
    post,
    path = "/get_quality_filtered_data",
    responses(
        (status = 200, description = "Rows meeting per-row quality thresholds"),
        (status = 400, description = "Dataset carries no per-row quality columns")
    ),
    tag = "Quality"
)]
pub async fn get_quality_filtered_data(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "get_quality_filtered_data", args).await
}

/// POST /get_validated_records
#[utoipa::path(
    post,
    path = "/get_validated_records",
    responses((status = 200, description = "Rows with parsed source lists and counts")),
    tag = "Quality"
)]
pub async fn get_validated_records(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "get_validated_records", args).await
}

/// POST /get_uncertainty_analysis
#[utoipa::path(
    post,
    path = "/get_uncertainty_analysis",
    responses((status = 200, description = "Per-year totals with 95% bounds")),
    tag = "Quality"
)]
pub async fn get_uncertainty_analysis(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "get_uncertainty_analysis", args).await
}
