//! Question Answering Endpoint
//!
//! The full pipeline: classify the question, answer conceptual questions
//! from the baseline provider without any tool call, and drive the
//! orchestrated tool loop for everything else.

use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use crate::middleware::RequestId;
use crate::models::{AnswerEnvelope, IntentKind, Persona};
use crate::services::intent::IntentClassifier;
use crate::utils::{ApiError, ApiResult, StringExt};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub persona: Option<Persona>,
}

/// POST /ask
#[utoipa::path(
    post,
    path = "/ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Structured answer envelope", body = AnswerEnvelope),
        (status = 400, description = "Empty question"),
        (status = 502, description = "LLM unavailable after retries")
    ),
    tag = "Ask"
)]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<AskRequest>,
) -> ApiResult<Json<AnswerEnvelope>> {
    let Some(question) = request.question.clean() else {
        return Err(ApiError::invalid_argument("question must not be empty")
            .with_request_id(request_id.0.clone()));
    };
    let question = question.as_str();
    let persona = request.persona.unwrap_or_default();

    let intent = IntentClassifier::classify(question, persona);
    tracing::info!(
        request_id = %request_id.0,
        intent = intent.kind.as_str(),
        persona = persona.as_str(),
        "question classified"
    );

    let envelope = match intent.kind {
        IntentKind::Baseline => {
            // Conceptual path: guaranteed zero tool calls.
            state.assembler.assemble_baseline(question, persona, &request_id.0)
        },
        kind => {
            let outcome = state
                .orchestrator
                .run(question, kind, persona, &request_id.0)
                .await
                .map_err(|e| e.with_request_id(request_id.0.clone()))?;
            state
                .assembler
                .assemble(question, kind, persona, &outcome, &request_id.0)
        },
    };

    Ok(Json(envelope))
}
