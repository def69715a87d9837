//! Answer Envelope Models
//!
//! Quality metadata and the structured answer returned to clients. The
//! quality numbers are always echoed from the manifest's sector quality
//! block, never derived from rows.

use serde::{Deserialize, Serialize};

use super::catalog::{ConfidenceTier, Sector, SectorQuality};
use super::entity::FallbackTrace;
use super::intent::{IntentKind, Persona};

/// Quality metadata attached to every data-bearing tool result.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QualityMetadata {
    pub sector: Sector,
    pub quality_score: u8,
    pub confidence_level: ConfidenceTier,
    pub uncertainty_pct: f64,
    pub external_sources: Vec<String>,
    pub data_version: String,
    pub recommended_uses: String,
}

impl QualityMetadata {
    /// Echo the sector quality block verbatim, stamped with the warehouse
    /// version.
    pub fn from_block(sector: Sector, block: &SectorQuality, data_version: &str) -> Self {
        let recommended_uses = match block.confidence_tier {
            ConfidenceTier::High => "Suitable for reporting and policy analysis".to_string(),
            ConfidenceTier::Medium => {
                "Suitable for trend analysis; cite uncertainty bounds".to_string()
            },
            ConfidenceTier::Low => {
                "Indicative only; corroborate before citing figures".to_string()
            },
        };
        Self {
            sector,
            quality_score: block.quality_score,
            confidence_level: block.confidence_tier,
            uncertainty_pct: block.uncertainty_pct,
            external_sources: block.external_sources.clone(),
            data_version: data_version.to_string(),
            recommended_uses,
        }
    }
}

/// The source/quality header cited on every data-backed answer.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AnswerHeader {
    pub sector: Sector,
    pub data_version: String,
    pub quality_score: u8,
    pub confidence_level: ConfidenceTier,
    pub uncertainty_pct: f64,
    pub sources_line: String,
}

/// Final structured answer for one question.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AnswerEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<AnswerHeader>,
    /// Factual prose constrained to returned rows (or the baseline answer).
    pub body: String,
    /// HYBRID enrichment, absent on pure WAREHOUSE/BASELINE answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub intent: IntentKind,
    pub persona: Persona,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub budget_exhausted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_trace: FallbackTrace,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}
