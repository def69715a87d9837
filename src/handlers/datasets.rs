//! Dataset Catalog Endpoints

use axum::{Extension, Json, extract::Path, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use super::call_tool;
use crate::AppState;
use crate::middleware::RequestId;
use crate::utils::ApiResult;

/// GET /list_files
#[utoipa::path(
    get,
    path = "/list_files",
    responses(
        (status = 200, description = "All queryable datasets with coverage and quality tier")
    ),
    tag = "Datasets"
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "list_emissions_datasets", json!({})).await
}

/// GET /get_schema/{file_id}
#[utoipa::path(
    get,
    path = "/get_schema/{file_id}",
    params(
        ("file_id" = String, Path, description = "Dataset id, format <sector>-<level>-<grain>")
    ),
    responses(
        (status = 200, description = "Columns, coverage and sector quality block"),
        (status = 404, description = "Unknown dataset, with nearest matches")
    ),
    tag = "Datasets"
)]
pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "get_dataset_schema", json!({"file_id": file_id})).await
}

/// GET /get_data_quality
#[utoipa::path(
    get,
    path = "/get_data_quality",
    responses(
        (status = 200, description = "Sector quality blocks for every sector")
    ),
    tag = "Datasets"
)]
pub async fn get_data_quality(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "get_data_quality", json!({})).await
}
