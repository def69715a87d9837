//! Analytics Endpoints
//!
//! Year-over-year, comparison, trend, monthly and seasonal operations plus
//! cross-sector aggregation, each mirroring its tool one-to-one.

use axum::{Extension, Json, extract::State};
use serde_json::Value;
use std::sync::Arc;

use super::call_tool;
use crate::AppState;
use crate::middleware::RequestId;
use crate::utils::ApiResult;

/// POST /metrics/yoy
#[utoipa::path(
    post,
    path = "/metrics/yoy",
    responses(
        (status = 200, description = "Entities ranked by year-over-year change"),
        (status = 400, description = "Validation error, e.g. a monthly dataset or an abbreviated parameter name")
    ),
    tag = "Analytics"
)]
pub async fn yoy(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "metrics.yoy", args).await
}

/// POST /compare_emissions
#[utoipa::path(
    post,
    path = "/compare_emissions",
    responses((status = 200, description = "Per-entity rows, ranking and deltas")),
    tag = "Analytics"
)]
pub async fn compare_emissions(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "compare_emissions", args).await
}

/// POST /analyze_emissions_trend
#[utoipa::path(
    post,
    path = "/analyze_emissions_trend",
    responses((status = 200, description = "Yearly series with CAGR and pattern label")),
    tag = "Analytics"
)]
pub async fn analyze_emissions_trend(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "analyze_emissions_trend", args).await
}

/// POST /analyze_monthly_trends
#[utoipa::path(
    post,
    path = "/analyze_monthly_trends",
    responses((status = 200, description = "Twelve-month profile with peak and trough")),
    tag = "Analytics"
)]
pub async fn analyze_monthly_trends(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "analyze_monthly_trends", args).await
}

/// POST /detect_seasonal_patterns
#[utoipa::path(
    post,
    path = "/detect_seasonal_patterns",
    responses((status = 200, description = "Per-month aggregates with seasonality score")),
    tag = "Analytics"
)]
pub async fn detect_seasonal_patterns(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "detect_seasonal_patterns", args).await
}

/// POST /aggregate_across_sectors
#[utoipa::path(
    post,
    path = "/aggregate_across_sectors",
    responses((status = 200, description = "Per-sector totals; missing sectors reported")),
    tag = "Analytics"
)]
pub async fn aggregate_across_sectors(
    State(state): State<Arc<AppState>>,
    request_id: Extension<RequestId>,
    Json(args): Json<Value>,
) -> ApiResult<Json<Value>> {
    call_tool(&state, &request_id, "aggregate_across_sectors", args).await
}
