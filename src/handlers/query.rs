//! Query Endpoints
//!
//! The request body of each endpoint is the tool's argument object, so HTTP
//! callers are validated against exactly the schema the LLM sees.

use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use super::call_tool;
use crate::AppState;
use crate::middleware::RequestId;
use crate::utils::{ApiError, ApiResult};

/// Maximum independent query specs in one batch request.
const MAX_BATCH: usize = 10;

/// POST /query
#[utoipa::path(
    post,
    path = "/query",
    responses(
        (status = 200, description = "Rows and metadata"),
        (status = 400, description = "Validation error with suggestions")
    ),
    tag = "Query"
)]
pub async fn query(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "query", args).await
}

/// POST /smart_query
#[utoipa::path(
    post,
    path = "/smart_query",
    responses(
        (status = 200, description = "Rows with resolution and fallback trace")
    ),
    tag = "Query"
)]
pub async fn smart_query(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "smart_query_emissions", args).await
}

/// POST /batch/query
///
/// Runs up to ten independent query specs; each item succeeds or fails on
/// its own.
#[utoipa::path(
    post,
    path = "/batch/query",
    responses(
        (status = 200, description = "Per-item results or structured errors")
    ),
    tag = "Query"
)]
pub async fn batch_query(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let items = body
        .get("queries")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ApiError::invalid_argument("body must be {\"queries\": [<query args>, ...]}")
                .with_request_id(request_id.0.clone())
        })?;
    if items.is_empty() || items.len() > MAX_BATCH {
        return Err(ApiError::invalid_argument(format!(
            "queries must contain between 1 and {} items",
            MAX_BATCH
        ))
        .with_request_id(request_id.0.clone()));
    }

    let mut results = Vec::with_capacity(items.len());
    for (index, args) in items.iter().enumerate() {
        match state.tool_surface.call("query", args).await {
            Ok(value) => results.push(json!({"index": index, "status": "ok", "result": value})),
            Err(e) => results.push(json!({
                "index": index,
                "status": "error",
                "error": {
                    "kind": e.kind.as_str(),
                    "detail": e.public_detail(),
                    "suggestions": e.suggestions,
                },
            })),
        }
    }

    Ok(Json(json!({"request_id": request_id.0, "results": results})))
}
