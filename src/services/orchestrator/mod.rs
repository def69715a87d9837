//! LLM Orchestrator
//!
//! Drives the bounded tool-use loop: system prompt with the tool catalog,
//! question in, then alternating model turns and tool observations until the
//! model produces a final answer or the call budget runs out. The model
//! must reply with either a `{"tool": ..., "args": {...}}` object or plain
//! prose, never both; anything else is fed back as an error observation.

mod client;

pub use client::{
    ChatBackend, ChatMessage, HttpChatBackend, LlmError, RetryPolicy, chat_with_retry,
};

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::models::{IntentKind, Persona};
use crate::services::baseline::BaselineProvider;
use crate::services::tools::{TOOL_SPECS, ToolSurface};
use crate::utils::{ApiError, ApiResult};

/// Observations larger than this are truncated before they re-enter the
/// context.
const OBSERVATION_LIMIT: usize = 8_000;

/// Invalid (non-tool-call, non-prose) model rounds tolerated before the raw
/// text is accepted as the final answer.
const MAX_INVALID_ROUNDS: u32 = 2;

/// Result of one orchestrated question.
#[derive(Debug, Clone)]
pub struct OrchestrationOutcome {
    pub final_text: String,
    pub tool_calls_made: u32,
    pub budget_exhausted: bool,
    /// Successful tool outputs in call order; the last one usually carries
    /// the rows the answer is grounded on.
    pub outputs: Vec<Value>,
}

pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolSurface>,
    baseline: Arc<BaselineProvider>,
    /// Process-wide bound on simultaneous LLM calls.
    gate: Arc<Semaphore>,
    retry: RetryPolicy,
    max_tool_calls: u32,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tools: Arc<ToolSurface>,
        baseline: Arc<BaselineProvider>,
        concurrency_limit: usize,
        retry: RetryPolicy,
        max_tool_calls: u32,
    ) -> Self {
        Self {
            backend,
            tools,
            baseline,
            gate: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            retry,
            max_tool_calls,
        }
    }

    /// Run the tool loop for one question. The intent kind shapes the
    /// facts/interpretation balance the model is instructed to produce.
    pub async fn run(
        &self,
        question: &str,
        intent: IntentKind,
        persona: Persona,
        request_id: &str,
    ) -> ApiResult<OrchestrationOutcome> {
        let mut messages = vec![
            ChatMessage::system(build_system_prompt(intent, persona, &self.baseline)),
            ChatMessage::user(question.to_string()),
        ];
        let mut tool_calls_made = 0u32;
        let mut invalid_rounds = 0u32;
        let mut outputs: Vec<Value> = Vec::new();

        // Upper bound on model rounds so a misbehaving model cannot spin:
        // one round per budgeted call plus slack for error observations.
        let max_rounds = self.max_tool_calls * 2 + 3;

        for round in 0..max_rounds {
            let text = self.chat(&messages).await?;
            tracing::debug!(request_id, round, chars = text.len(), "model turn received");

            match parse_model_message(&text) {
                ModelMessage::Final(answer) => {
                    return Ok(OrchestrationOutcome {
                        final_text: answer,
                        tool_calls_made,
                        budget_exhausted: false,
                        outputs,
                    });
                },
                ModelMessage::ToolCall { tool, args } => {
                    if tool_calls_made >= self.max_tool_calls {
                        return Ok(self
                            .finish_over_budget(messages, text, tool_calls_made, outputs)
                            .await);
                    }
                    tool_calls_made += 1;

                    let observation = match self.tools.call(&tool, &args).await {
                        Ok(value) => {
                            outputs.push(value.clone());
                            json!({"status": "ok", "result": value})
                        },
                        Err(e) => {
                            tracing::debug!(
                                request_id,
                                tool = %tool,
                                kind = e.kind.as_str(),
                                "tool call rejected"
                            );
                            json!({
                                "status": "error",
                                "error": {
                                    "kind": e.kind.as_str(),
                                    "detail": e.public_detail(),
                                    "suggestions": e.suggestions,
                                },
                            })
                        },
                    };

                    messages.push(ChatMessage::assistant(text));
                    messages.push(ChatMessage::user(format!(
                        "Observation: {}",
                        truncate_observation(&observation.to_string())
                    )));
                },
                ModelMessage::Invalid(validation_message) => {
                    invalid_rounds += 1;
                    if invalid_rounds > MAX_INVALID_ROUNDS {
                        // Stop arguing with the model; take its text as-is.
                        return Ok(OrchestrationOutcome {
                            final_text: text,
                            tool_calls_made,
                            budget_exhausted: false,
                            outputs,
                        });
                    }
                    messages.push(ChatMessage::assistant(text));
                    messages.push(ChatMessage::user(format!(
                        "Observation: {}",
                        json!({
                            "status": "error",
                            "error": {"kind": "InvalidArgument", "detail": validation_message},
                        })
                    )));
                },
            }
        }

        Err(ApiError::budget_exhausted(
            "model kept requesting tools past the round limit",
        ))
    }

    /// Budget hit while the model still wants tools: give it one explicit
    /// chance to summarise from the observations it already has.
    async fn finish_over_budget(
        &self,
        mut messages: Vec<ChatMessage>,
        last_model_text: String,
        tool_calls_made: u32,
        outputs: Vec<Value>,
    ) -> OrchestrationOutcome {
        messages.push(ChatMessage::assistant(last_model_text));
        messages.push(ChatMessage::user(
            "Observation: {\"status\": \"error\", \"error\": {\"kind\": \"BudgetExhausted\", \
             \"detail\": \"tool-call budget reached; answer now from the observations above, \
             in plain text\"}}"
                .to_string(),
        ));

        let final_text = match self.chat(&messages).await {
            Ok(text) => match parse_model_message(&text) {
                ModelMessage::Final(answer) => answer,
                _ => text,
            },
            Err(e) => {
                tracing::warn!(error = %e, "summary call after budget exhaustion failed");
                "The tool-call budget was reached before a complete answer could be \
                 assembled; the partial observations did not yield a final figure."
                    .to_string()
            },
        };

        OrchestrationOutcome {
            final_text,
            tool_calls_made,
            budget_exhausted: true,
            outputs,
        }
    }

    /// One gated, retried chat call. The permit is dropped on every exit
    /// path, including cancellation.
    async fn chat(&self, messages: &[ChatMessage]) -> ApiResult<String> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ApiError::internal_error("LLM concurrency gate closed"))?;
        chat_with_retry(self.backend.as_ref(), messages, &self.retry)
            .await
            .map_err(|e| ApiError::llm_unavailable(e.to_string()))
    }
}

// ============================================================================
// Model message parsing
// ============================================================================

enum ModelMessage {
    ToolCall { tool: String, args: Value },
    Final(String),
    /// Valid JSON that is neither a tool call nor prose; fed back as an
    /// error observation.
    Invalid(String),
}

fn parse_model_message(text: &str) -> ModelMessage {
    let stripped = strip_code_fence(text.trim());

    let Ok(value) = serde_json::from_str::<Value>(stripped) else {
        return ModelMessage::Final(text.trim().to_string());
    };

    match &value {
        Value::Object(object) => match object.get("tool") {
            Some(Value::String(tool)) => {
                let args = object.get("args").cloned().unwrap_or_else(|| json!({}));
                if args.is_object() {
                    ModelMessage::ToolCall { tool: tool.clone(), args }
                } else {
                    ModelMessage::Invalid(
                        "\"args\" must be a JSON object of tool arguments".to_string(),
                    )
                }
            },
            Some(_) => ModelMessage::Invalid("\"tool\" must be a string tool name".to_string()),
            None => ModelMessage::Invalid(
                "JSON response must be a tool call of the form {\"tool\": \"<name>\", \
                 \"args\": {...}}; answer in plain text when no tool is needed"
                    .to_string(),
            ),
        },
        // A bare JSON string is prose that happened to be quoted.
        Value::String(s) => ModelMessage::Final(s.clone()),
        _ => ModelMessage::Invalid(
            "response must be a tool-call object or plain text, not a JSON array/scalar"
                .to_string(),
        ),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") up to the first newline, then the
    // closing fence.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.strip_suffix("```").map(str::trim_end).unwrap_or(body).trim()
}

fn truncate_observation(serialised: &str) -> String {
    if serialised.len() <= OBSERVATION_LIMIT {
        return serialised.to_string();
    }
    let mut cut = OBSERVATION_LIMIT;
    while !serialised.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated, {} bytes total)", &serialised[..cut], serialised.len())
}

// ============================================================================
// System prompt
// ============================================================================

/// Build the system prompt from the tool catalog. Tool and parameter names
/// come straight from `TOOL_SPECS`, so the prompt can never drift from what
/// the validator accepts. The intent kind sets the facts/interpretation
/// balance of the final answer.
pub fn build_system_prompt(
    intent: IntentKind,
    persona: Persona,
    baseline: &BaselineProvider,
) -> String {
    let framing = baseline.persona_framing(persona);

    let mut prompt = String::new();
    prompt.push_str(
        "You are the analysis engine of an emissions data service. You answer \
         questions about historical CO2 emissions using a structured warehouse \
         (EDGAR v2024, yearly and monthly data, eight sectors, country/admin1/city \
         levels) reached through the tools listed below.\n\n",
    );
    prompt.push_str(&format!(
        "Audience: {} (focus on {}; tone: {}).\n\n",
        persona.as_str(),
        framing.focus,
        framing.tone
    ));

    let balance = match intent {
        IntentKind::Warehouse => {
            "This is a data question: make the final answer about seventy percent \
             cited figures and thirty percent interpretation. State the numbers \
             with units first, then close with at most one or two interpretive \
             sentences."
        },
        IntentKind::Hybrid => {
            "This question wants data plus interpretation: lead with the cited \
             figures, then interpret at length (roughly forty percent figures, \
             sixty percent interpretation). Curated background is appended to \
             your answer separately, so do not restate textbook context."
        },
        IntentKind::Baseline => {
            "This is a conceptual question: answer qualitatively, without tool \
             calls and without inventing numbers."
        },
    };
    prompt.push_str(&format!("Question type: {}. {}\n\n", intent.as_str(), balance));

    prompt.push_str("## Tools\n\n");
    for spec in TOOL_SPECS.iter() {
        let required = spec.required_names().join(", ");
        let optional: Vec<&str> = spec
            .property_names()
            .into_iter()
            .filter(|p| !spec.required_names().contains(p))
            .collect();
        prompt.push_str(&format!("### {}\n{}\n", spec.name.as_str(), spec.description));
        if !required.is_empty() {
            prompt.push_str(&format!("Required: {}\n", required));
        }
        if !optional.is_empty() {
            prompt.push_str(&format!("Optional: {}\n", optional.join(", ")));
        }
        prompt.push_str(&format!("Example: {}\n\n", spec.example));
    }

    prompt.push_str(
        "## Output rules\n\n\
         1. To call a tool, respond with EXACTLY one JSON object: \
         {\"tool\": \"<name>\", \"args\": {...}} and nothing else, no prose around it.\n\
         2. To give the final answer, respond with plain text only; never mix \
         JSON and prose in one response.\n\
         3. Use parameter names exactly as listed; abbreviations are rejected.\n\
         4. Cite concrete values with units (tonnes or MtCO2) from tool results; \
         never invent numbers.\n\
         5. If a tool returns an error, read its detail and suggestions, fix the \
         call or choose another tool.\n\
         6. Start with smart_query_emissions for place-name questions; use \
         list_emissions_datasets and get_dataset_schema when unsure what exists.\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_json_is_parsed() {
        let msg = parse_model_message(
            r#"{"tool": "query", "args": {"file_id": "transport-country-year"}}"#,
        );
        match msg {
            ModelMessage::ToolCall { tool, args } => {
                assert_eq!(tool, "query");
                assert_eq!(args["file_id"], "transport-country-year");
            },
            _ => panic!("expected tool call"),
        }
    }

    #[test]
    fn fenced_tool_call_is_parsed() {
        let msg = parse_model_message(
            "```json\n{\"tool\": \"list_emissions_datasets\", \"args\": {}}\n```",
        );
        assert!(matches!(msg, ModelMessage::ToolCall { .. }));
    }

    #[test]
    fn prose_is_final_answer() {
        let msg = parse_model_message("Transport emissions in Germany were substantial.");
        match msg {
            ModelMessage::Final(text) => assert!(text.contains("Germany")),
            _ => panic!("expected final answer"),
        }
    }

    #[test]
    fn json_without_tool_key_is_invalid() {
        let msg = parse_model_message(r#"{"answer": "42 tonnes"}"#);
        assert!(matches!(msg, ModelMessage::Invalid(_)));
    }

    #[test]
    fn observation_truncation_is_bounded_and_utf8_safe() {
        let long = "ä".repeat(OBSERVATION_LIMIT);
        let truncated = truncate_observation(&long);
        assert!(truncated.len() < long.len() + 64);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn system_prompt_carries_canonical_names() {
        let baseline = BaselineProvider::new();
        let prompt = build_system_prompt(IntentKind::Warehouse, Persona::Analyst, &baseline);
        for spec in TOOL_SPECS.iter() {
            assert!(prompt.contains(spec.name.as_str()));
        }
        assert!(prompt.contains("key_column"));
        assert!(!prompt.contains("key_col,"));
    }

    #[test]
    fn prompt_balance_follows_the_intent_kind() {
        let baseline = BaselineProvider::new();
        let warehouse =
            build_system_prompt(IntentKind::Warehouse, Persona::Analyst, &baseline);
        let hybrid = build_system_prompt(IntentKind::Hybrid, Persona::Analyst, &baseline);

        assert!(warehouse.contains("Question type: WAREHOUSE"));
        assert!(warehouse.contains("seventy percent"));
        assert!(hybrid.contains("Question type: HYBRID"));
        assert!(hybrid.contains("interpret at length"));
        assert_ne!(warehouse, hybrid);
    }
}
