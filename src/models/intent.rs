//! Intent Model
//!
//! Output of the intent classifier: the routing decision plus everything it
//! managed to extract from the question text.

use serde::{Deserialize, Serialize};

use super::catalog::{Grain, Sector};

/// Routing decision for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentKind {
    /// Conceptual question, answered from curated knowledge only.
    Baseline,
    /// Numeric question, answered from the warehouse only.
    Warehouse,
    /// Numeric question that also wants interpretation.
    Hybrid,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "BASELINE",
            Self::Warehouse => "WAREHOUSE",
            Self::Hybrid => "HYBRID",
        }
    }
}

/// One of the four audience framings. Shapes tone and interpretation balance,
/// never data content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Analyst,
    Researcher,
    Financial,
    Student,
}

impl Persona {
    pub const ALL: [Persona; 4] =
        [Persona::Analyst, Persona::Researcher, Persona::Financial, Persona::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Researcher => "researcher",
            Self::Financial => "financial",
            Self::Student => "student",
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::Analyst
    }
}

/// Operation shape hinted by the question. Advisory only: the orchestrator's
/// tool choice is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationHint {
    Simple,
    Compare,
    TopN,
    Trend,
    Yoy,
    Seasonal,
    Aggregate,
}

/// Classifier output for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub sectors: Vec<Sector>,
    /// Raw place names as they appeared in the question.
    pub entities: Vec<String>,
    pub years: Vec<i32>,
    pub year_range: Option<(i32, i32)>,
    pub grain: Grain,
    pub operation: OperationHint,
    pub persona: Persona,
}
