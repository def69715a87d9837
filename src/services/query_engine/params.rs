//! Tool Parameter Structs
//!
//! One struct per analytical operation, deserialized from validated tool
//! arguments. Field names here are the canonical parameter names; the tool
//! schemas, the HTTP surface and the LLM prompt all use exactly these.
//!
//! `select`/`where`/`group_by`/`order_by`/`aggregations` stay as raw JSON
//! values so the engine can run its own shape checks and report precise
//! positions instead of a generic deserialization error.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    pub file_id: String,
    #[serde(default)]
    pub select: Option<Value>,
    #[serde(default, rename = "where")]
    pub r#where: Option<Value>,
    #[serde(default)]
    pub group_by: Option<Value>,
    #[serde(default)]
    pub order_by: Option<Value>,
    #[serde(default)]
    pub aggregations: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopNParams {
    pub file_id: String,
    pub key_column: String,
    #[serde(default = "default_value_column")]
    pub value_column: String,
    pub year: i32,
    #[serde(default = "default_top_n")]
    pub n: u32,
    #[serde(default = "default_desc")]
    pub direction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YoyParams {
    pub file_id: String,
    pub key_column: String,
    #[serde(default = "default_value_column")]
    pub value_column: String,
    pub base_year: i32,
    pub compare_year: i32,
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    /// "drop" ranks the largest decreases first, "rise" the largest
    /// increases.
    #[serde(default = "default_drop")]
    pub direction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyTrendsParams {
    pub file_id: String,
    pub entity_column: String,
    pub entity_value: String,
    pub year: i32,
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonalParams {
    pub file_id: String,
    pub entity_column: String,
    pub entity_value: String,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareParams {
    pub entities: Vec<String>,
    pub sector: String,
    pub year: i32,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendParams {
    pub entity: String,
    pub sector: String,
    pub start_year: i32,
    pub end_year: i32,
    #[serde(default = "default_grain")]
    pub grain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateParams {
    pub entity: String,
    #[serde(default)]
    pub level: Option<String>,
    /// "all" or an explicit sector list.
    pub sectors: Value,
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmartQueryParams {
    pub entity: String,
    pub sector: String,
    pub year: i32,
    #[serde(default = "default_grain")]
    pub grain: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityFilteredParams {
    pub file_id: String,
    #[serde(default = "default_min_quality")]
    pub min_quality_score: f64,
    #[serde(default = "default_confidence_all")]
    pub confidence_level: String,
    #[serde(default = "default_max_uncertainty")]
    pub max_uncertainty: f64,
    #[serde(default)]
    pub exclude_synthetic: bool,
    #[serde(default)]
    pub limit: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatedRecordsParams {
    pub file_id: String,
    #[serde(default = "default_min_sources")]
    pub min_sources: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub limit: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UncertaintyParams {
    pub file_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub year_start: Option<i32>,
    #[serde(default)]
    pub year_end: Option<i32>,
    #[serde(default = "default_true")]
    pub include_trends: bool,
}

fn default_value_column() -> String {
    "emissions_tonnes".to_string()
}

fn default_top_n() -> u32 {
    10
}

fn default_desc() -> String {
    "desc".to_string()
}

fn default_drop() -> String {
    "drop".to_string()
}

fn default_grain() -> String {
    "year".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_quality() -> f64 {
    85.0
}

fn default_confidence_all() -> String {
    "ALL".to_string()
}

fn default_max_uncertainty() -> f64 {
    20.0
}

fn default_min_sources() -> u32 {
    1
}
