//! Response Assembler
//!
//! Composes the final answer envelope: source/quality header drawn verbatim
//! from the sector quality block, the model-authored factual body, and the
//! persona-shaped context section on HYBRID answers. When no data came
//! back, the assembler says so plainly and surfaces the fallback trace; it
//! never invents numbers.

use serde_json::Value;
use std::sync::Arc;

use crate::models::{
    AnswerEnvelope, AnswerHeader, FallbackTrace, IntentKind, Persona, QualityMetadata,
};
use crate::services::baseline::BaselineProvider;
use crate::services::orchestrator::OrchestrationOutcome;

pub struct ResponseAssembler {
    baseline: Arc<BaselineProvider>,
}

impl ResponseAssembler {
    pub fn new(baseline: Arc<BaselineProvider>) -> Self {
        Self { baseline }
    }

    /// BASELINE path: no tools were called, the whole answer is curated
    /// interpretation.
    pub fn assemble_baseline(
        &self,
        question: &str,
        persona: Persona,
        request_id: &str,
    ) -> AnswerEnvelope {
        AnswerEnvelope {
            header: None,
            body: self.baseline.baseline_answer(question, persona),
            context: None,
            intent: IntentKind::Baseline,
            persona,
            request_id: request_id.to_string(),
            budget_exhausted: false,
            fallback_trace: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// WAREHOUSE and HYBRID paths: header from the grounding tool output,
    /// body from the model, context injected on HYBRID only.
    pub fn assemble(
        &self,
        question: &str,
        intent: IntentKind,
        persona: Persona,
        outcome: &OrchestrationOutcome,
        request_id: &str,
    ) -> AnswerEnvelope {
        let grounding = find_grounding(&outcome.outputs);

        let header = grounding.as_ref().and_then(|g| {
            g.quality.as_ref().map(|q| AnswerHeader {
                sector: q.sector,
                data_version: q.data_version.clone(),
                quality_score: q.quality_score,
                confidence_level: q.confidence_level,
                uncertainty_pct: q.uncertainty_pct,
                sources_line: format_sources_line(&q.external_sources),
            })
        });

        let has_rows = grounding.as_ref().is_some_and(|g| g.row_count > 0);
        let fallback_trace =
            grounding.as_ref().map(|g| g.fallback_trace.clone()).unwrap_or_default();
        let suggestions = grounding.as_ref().map(|g| g.suggestions.clone()).unwrap_or_default();

        let body = if has_rows || outcome.outputs.is_empty() {
            outcome.final_text.clone()
        } else {
            // Data was asked for and none came back at any granularity.
            no_data_body(&fallback_trace, &suggestions)
        };

        // Enrichment never blocks the factual path: HYBRID only, and absent
        // sections are simply skipped.
        let context = match intent {
            IntentKind::Hybrid if has_rows => {
                let enrichment = self.baseline.enrich(question, persona);
                render_context(
                    enrichment.sector_explanation.as_deref(),
                    enrichment.country_context.as_deref(),
                    enrichment.trend_context.as_deref(),
                    enrichment.seasonal_context.as_deref(),
                    &enrichment.interpretation_focus,
                )
            },
            _ => None,
        };

        AnswerEnvelope {
            header: if has_rows { header } else { None },
            body,
            context,
            intent,
            persona,
            request_id: request_id.to_string(),
            budget_exhausted: outcome.budget_exhausted,
            fallback_trace,
            suggestions,
        }
    }
}

struct Grounding {
    quality: Option<QualityMetadata>,
    row_count: u64,
    fallback_trace: FallbackTrace,
    suggestions: Vec<String>,
}

/// Pick the tool output the answer is grounded on: the latest one that
/// returned rows, falling back to the latest with any metadata.
fn find_grounding(outputs: &[Value]) -> Option<Grounding> {
    let pick = outputs
        .iter()
        .rev()
        .find(|o| {
            o.get("meta")
                .and_then(|m| m.get("row_count"))
                .and_then(Value::as_u64)
                .unwrap_or(0)
                > 0
        })
        .or_else(|| outputs.iter().rev().find(|o| o.get("meta").is_some()))?;

    let meta = pick.get("meta")?;

    // `quality_metadata` is a single block for single-sector operations and
    // a list for cross-sector aggregation; the header cites the first.
    let quality_value = match meta.get("quality_metadata") {
        Some(Value::Array(items)) => items.first().cloned(),
        Some(other) => Some(other.clone()),
        None => None,
    };
    let quality =
        quality_value.and_then(|v| serde_json::from_value::<QualityMetadata>(v).ok());

    let fallback_trace = meta
        .get("fallback_trace")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let suggestions = meta
        .get("suggestions")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    Some(Grounding {
        quality,
        row_count: meta.get("row_count").and_then(Value::as_u64).unwrap_or(0),
        fallback_trace,
        suggestions,
    })
}

/// Source list formatting: 1 source in full, 2-3 joined, 4+ summarised.
pub fn format_sources_line(sources: &[String]) -> String {
    match sources.len() {
        0 => "no external validation sources on record".to_string(),
        1 => sources[0].clone(),
        2 | 3 => sources.join(", "),
        n => format!(
            "{} authoritative sources including: {}, {}, {}, and others",
            n, sources[0], sources[1], sources[2]
        ),
    }
}

fn no_data_body(trace: &FallbackTrace, suggestions: &[String]) -> String {
    let mut body = String::from(
        "No data is available at the requested granularity for this question.",
    );
    if !trace.is_empty() {
        let attempts: Vec<String> = trace
            .iter()
            .map(|step| format!("{}: {}", step.level, step.status.as_str()))
            .collect();
        body.push_str(&format!(" Levels tried: {}.", attempts.join(", ")));
    }
    if !suggestions.is_empty() {
        body.push_str(&format!(" Suggestions: {}.", suggestions.join("; ")));
    }
    body
}

fn render_context(
    sector: Option<&str>,
    country: Option<&str>,
    trend: Option<&str>,
    seasonal: Option<&str>,
    focus: &str,
) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();
    if let Some(text) = sector {
        sections.push(format!("Sector context: {}", text));
    }
    if let Some(text) = country {
        sections.push(format!("Country context: {}", text));
    }
    if let Some(text) = trend {
        sections.push(format!("Trend context: {}", text));
    }
    if let Some(text) = seasonal {
        sections.push(format!("Seasonal context: {}", text));
    }
    if sections.is_empty() {
        return None;
    }
    sections.push(format!("Interpretation focus: {}", focus));
    Some(sections.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome_with(outputs: Vec<Value>) -> OrchestrationOutcome {
        OrchestrationOutcome {
            final_text: "Transport emissions in Germany in 2023 were 148 million tonnes."
                .to_string(),
            tool_calls_made: 1,
            budget_exhausted: false,
            outputs,
        }
    }

    fn data_output() -> Value {
        json!({
            "rows": [{"country_name": "Germany", "year": 2023, "emissions_tonnes": 1.48e8}],
            "meta": {
                "row_count": 1,
                "file_id": "transport-country-year",
                "quality_metadata": {
                    "sector": "transport",
                    "quality_score": 85,
                    "confidence_level": "HIGH",
                    "uncertainty_pct": 12.0,
                    "external_sources": ["IEA", "UNFCCC"],
                    "data_version": "EDGAR v2024",
                    "recommended_uses": "Suitable for reporting and policy analysis",
                },
            },
        })
    }

    #[test]
    fn sources_line_formatting_rules() {
        assert_eq!(format_sources_line(&["IEA".into()]), "IEA");
        assert_eq!(
            format_sources_line(&["IEA".into(), "UNFCCC".into()]),
            "IEA, UNFCCC"
        );
        let many: Vec<String> =
            ["IEA", "UNFCCC", "CDIAC", "National Inventory", "FAO"].iter().map(|s| s.to_string()).collect();
        let line = format_sources_line(&many);
        assert!(line.starts_with("5 authoritative sources including: IEA, UNFCCC, CDIAC"));
        assert!(line.ends_with("and others"));
    }

    #[test]
    fn warehouse_answer_gets_header_and_no_context() {
        let assembler = ResponseAssembler::new(Arc::new(BaselineProvider::new()));
        let envelope = assembler.assemble(
            "What were transport emissions in Germany in 2023?",
            IntentKind::Warehouse,
            Persona::Analyst,
            &outcome_with(vec![data_output()]),
            "req-1",
        );
        let header = envelope.header.expect("header present");
        assert_eq!(header.quality_score, 85);
        assert_eq!(header.sources_line, "IEA, UNFCCC");
        assert!(envelope.context.is_none());
        assert!(envelope.body.contains("tonnes"));
    }

    #[test]
    fn hybrid_answer_gets_context() {
        let assembler = ResponseAssembler::new(Arc::new(BaselineProvider::new()));
        let envelope = assembler.assemble(
            "Explain how transport emissions in Germany changed in 2023",
            IntentKind::Hybrid,
            Persona::Student,
            &outcome_with(vec![data_output()]),
            "req-2",
        );
        let context = envelope.context.expect("context present");
        assert!(context.contains("Sector context"));
        assert!(context.contains("Interpretation focus"));
    }

    #[test]
    fn zero_rows_yields_no_data_body_without_header() {
        let assembler = ResponseAssembler::new(Arc::new(BaselineProvider::new()));
        let empty = json!({
            "rows": [],
            "meta": {
                "row_count": 0,
                "fallback_trace": [
                    {"level": "city", "status": "no_data", "entity": "Munich"},
                    {"level": "admin1", "status": "no_data", "entity": "Bavaria"},
                    {"level": "country", "status": "no_data", "entity": "Germany"},
                ],
                "suggestions": ["try a different year or sector"],
            },
        });
        let envelope = assembler.assemble(
            "Transport emissions for Munich in 2023?",
            IntentKind::Warehouse,
            Persona::Analyst,
            &outcome_with(vec![empty]),
            "req-3",
        );
        assert!(envelope.header.is_none());
        assert!(envelope.body.contains("No data is available"));
        assert!(envelope.body.contains("city: no_data"));
        assert_eq!(envelope.fallback_trace.len(), 3);
    }

    #[test]
    fn baseline_answer_has_no_header() {
        let assembler = ResponseAssembler::new(Arc::new(BaselineProvider::new()));
        let envelope = assembler.assemble_baseline(
            "What is the Paris Agreement?",
            Persona::Student,
            "req-4",
        );
        assert!(envelope.header.is_none());
        assert_eq!(envelope.intent, IntentKind::Baseline);
        assert!(!envelope.body.is_empty());
    }
}
