//! Entity Models
//!
//! Canonical geographic entities, resolver output and the fallback trace
//! recorded while cascading city -> admin1 -> country.

use serde::{Deserialize, Serialize};

use super::catalog::Level;

/// A canonical geographic entity known to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub canonical_name: String,
    pub level: Level,
    /// ISO 3166-1 alpha-3 code when known (countries only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso3: Option<String>,
}

/// Successful normalisation of a user-provided place name.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResolvedEntity {
    pub raw_name: String,
    pub canonical_name: String,
    pub level: Level,
    /// 1.0 for exact/alias hits, the fuzzy score otherwise.
    pub similarity: f64,
    /// Close alternatives, best first. Non-empty only for fuzzy hits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// Outcome of probing one geographic level during a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStatus {
    Ok,
    NoData,
    UnknownEntity,
    DatasetMissing,
}

impl FallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NoData => "no_data",
            Self::UnknownEntity => "unknown_entity",
            Self::DatasetMissing => "dataset_missing",
        }
    }
}

/// One attempted `(level, status)` pair in a cascade.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FallbackStep {
    pub level: Level,
    pub status: FallbackStatus,
    /// Entity name probed at this level.
    pub entity: String,
}

/// Ordered record of which levels were tried when resolving an entity to
/// data. Part of the observable result, not a debugging aid.
pub type FallbackTrace = Vec<FallbackStep>;
