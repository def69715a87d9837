pub mod ask;
pub mod cache_admin;
pub mod datasets;
pub mod health;
pub mod metrics;
pub mod quality;
pub mod query;

use axum::Extension;
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

use crate::AppState;
use crate::middleware::RequestId;
use crate::utils::ApiResult;

/// Route one HTTP body through the tool surface. The body is the tool's
/// argument object, so HTTP requests hit exactly the same schema validation
/// as stdio and LLM calls.
pub(crate) async fn call_tool(
    state: &Arc<AppState>,
    request_id: &Extension<RequestId>,
    tool: &str,
    args: Value,
) -> ApiResult<Json<Value>> {
    state
        .tool_surface
        .call(tool, &args)
        .await
        .map(Json)
        .map_err(|e| e.with_request_id(request_id.0.0.clone()))
}
