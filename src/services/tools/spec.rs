//! Tool Catalog
//!
//! The closed set of tool names and one declarative input schema per tool.
//! This table is the single source of truth consumed by the stdio server,
//! the HTTP facade and the LLM system prompt, so the three surfaces can
//! never drift apart. Only canonical parameter names validate; close
//! misspellings are rejected with a pointer to the canonical name.

use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::str::FromStr;

/// Closed enumeration of tool names. Dispatch is a table lookup over this
/// enum, never reflective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListEmissionsDatasets,
    GetDatasetSchema,
    Query,
    MetricsYoy,
    AnalyzeMonthlyTrends,
    DetectSeasonalPatterns,
    AggregateAcrossSectors,
    CompareEmissions,
    AnalyzeEmissionsTrend,
    SmartQueryEmissions,
    GetQualityFilteredData,
    GetValidatedRecords,
    GetUncertaintyAnalysis,
    GetDataQuality,
}

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        ToolName::ListEmissionsDatasets,
        ToolName::GetDatasetSchema,
        ToolName::Query,
        ToolName::MetricsYoy,
        ToolName::AnalyzeMonthlyTrends,
        ToolName::DetectSeasonalPatterns,
        ToolName::AggregateAcrossSectors,
        ToolName::CompareEmissions,
        ToolName::AnalyzeEmissionsTrend,
        ToolName::SmartQueryEmissions,
        ToolName::GetQualityFilteredData,
        ToolName::GetValidatedRecords,
        ToolName::GetUncertaintyAnalysis,
        ToolName::GetDataQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListEmissionsDatasets => "list_emissions_datasets",
            Self::GetDatasetSchema => "get_dataset_schema",
            Self::Query => "query",
            Self::MetricsYoy => "metrics.yoy",
            Self::AnalyzeMonthlyTrends => "analyze_monthly_trends",
            Self::DetectSeasonalPatterns => "detect_seasonal_patterns",
            Self::AggregateAcrossSectors => "aggregate_across_sectors",
            Self::CompareEmissions => "compare_emissions",
            Self::AnalyzeEmissionsTrend => "analyze_emissions_trend",
            Self::SmartQueryEmissions => "smart_query_emissions",
            Self::GetQualityFilteredData => "get_quality_filtered_data",
            Self::GetValidatedRecords => "get_validated_records",
            Self::GetUncertaintyAnalysis => "get_uncertainty_analysis",
            Self::GetDataQuality => "get_data_quality",
        }
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown tool '{}'", s))
    }
}

/// Declarative description of one tool: its JSON-schema input and a short
/// example for the LLM prompt.
pub struct ToolSpec {
    pub name: ToolName,
    pub description: &'static str,
    pub schema: Value,
    pub example: &'static str,
}

impl ToolSpec {
    /// Property names declared by this tool's schema.
    pub fn property_names(&self) -> Vec<&str> {
        self.schema["properties"]
            .as_object()
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn required_names(&self) -> Vec<&str> {
        self.schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// The full catalog, built once.
pub static TOOL_SPECS: Lazy<Vec<ToolSpec>> = Lazy::new(|| {
    vec![
        ToolSpec {
            name: ToolName::ListEmissionsDatasets,
            description: "List every queryable emissions dataset with coverage and quality tier.",
            schema: object_schema(json!({}), json!([])),
            example: r#"{"tool": "list_emissions_datasets", "args": {}}"#,
        },
        ToolSpec {
            name: ToolName::GetDatasetSchema,
            description: "Columns, coverage and quality block for one dataset.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string", "description": "Dataset id, format <sector>-<level>-<grain>"},
                }),
                json!(["file_id"]),
            ),
            example: r#"{"tool": "get_dataset_schema", "args": {"file_id": "transport-country-year"}}"#,
        },
        ToolSpec {
            name: ToolName::Query,
            description: "Filtered, optionally aggregated query over one dataset.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string"},
                    "select": {"type": "array", "items": {"type": "string"}, "description": "Flat list of column names"},
                    "where": {"type": "object", "description": "column -> scalar, list, or range object {gte,lte,gt,lt,in,contains}"},
                    "group_by": {"type": "array", "items": {"type": "string"}},
                    "order_by": {"type": "array", "items": {"type": "string"}, "description": "'column' or 'column desc'"},
                    "aggregations": {"type": "object", "description": "column -> SUM|AVG|MIN|MAX|COUNT"},
                    "limit": {"type": "integer", "description": "default 20, maximum 1000"},
                }),
                json!(["file_id"]),
            ),
            example: r#"{"tool": "query", "args": {"file_id": "transport-country-year", "select": ["country_name", "year", "emissions_tonnes"], "where": {"country_name": "Germany", "year": 2023}}}"#,
        },
        ToolSpec {
            name: ToolName::MetricsYoy,
            description: "Rank entities by year-over-year change between two years.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string"},
                    "key_column": {"type": "string", "description": "Entity column to rank, e.g. country_name"},
                    "value_column": {"type": "string", "description": "Measure column, default emissions_tonnes"},
                    "base_year": {"type": "integer"},
                    "compare_year": {"type": "integer"},
                    "top_n": {"type": "integer", "description": "default 10"},
                    "direction": {"type": "string", "enum": ["drop", "rise"], "description": "default drop"},
                }),
                json!(["file_id", "key_column", "base_year", "compare_year"]),
            ),
            example: r#"{"tool": "metrics.yoy", "args": {"file_id": "transport-country-year", "key_column": "country_name", "base_year": 2020, "compare_year": 2023, "top_n": 5, "direction": "drop"}}"#,
        },
        ToolSpec {
            name: ToolName::AnalyzeMonthlyTrends,
            description: "Twelve-month profile with share-of-year and peak/trough months.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string", "description": "Must be a month-grain dataset"},
                    "entity_column": {"type": "string"},
                    "entity_value": {"type": "string"},
                    "year": {"type": "integer"},
                    "value_column": {"type": "string", "description": "default emissions_tonnes"},
                }),
                json!(["file_id", "entity_column", "entity_value", "year"]),
            ),
            example: r#"{"tool": "analyze_monthly_trends", "args": {"file_id": "power-country-month", "entity_column": "country_name", "entity_value": "Germany", "year": 2023}}"#,
        },
        ToolSpec {
            name: ToolName::DetectSeasonalPatterns,
            description: "Per-month aggregates across years with a seasonality score.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string", "description": "Must be a month-grain dataset"},
                    "entity_column": {"type": "string"},
                    "entity_value": {"type": "string"},
                    "years": {"type": "array", "items": {"type": "integer"}},
                }),
                json!(["file_id", "entity_column", "entity_value", "years"]),
            ),
            example: r#"{"tool": "detect_seasonal_patterns", "args": {"file_id": "power-country-month", "entity_column": "country_name", "entity_value": "Germany", "years": [2021, 2022, 2023]}}"#,
        },
        ToolSpec {
            name: ToolName::AggregateAcrossSectors,
            description: "Sum one entity-year across sectors; missing sectors are reported.",
            schema: object_schema(
                json!({
                    "entity": {"type": "string"},
                    "level": {"type": "string", "enum": ["country", "admin1", "city"]},
                    "sectors": {"description": "\"all\" or a list of sector names"},
                    "year": {"type": "integer"},
                }),
                json!(["entity", "sectors", "year"]),
            ),
            example: r#"{"tool": "aggregate_across_sectors", "args": {"entity": "Germany", "sectors": "all", "year": 2023}}"#,
        },
        ToolSpec {
            name: ToolName::CompareEmissions,
            description: "Compare entities within one sector and year, with ranking and deltas.",
            schema: object_schema(
                json!({
                    "entities": {"type": "array", "items": {"type": "string"}},
                    "sector": {"type": "string"},
                    "year": {"type": "integer"},
                    "level": {"type": "string", "enum": ["country", "admin1", "city"]},
                }),
                json!(["entities", "sector", "year"]),
            ),
            example: r#"{"tool": "compare_emissions", "args": {"entities": ["Germany", "France"], "sector": "transport", "year": 2023}}"#,
        },
        ToolSpec {
            name: ToolName::AnalyzeEmissionsTrend,
            description: "Yearly series with total change, CAGR and a pattern label.",
            schema: object_schema(
                json!({
                    "entity": {"type": "string"},
                    "sector": {"type": "string"},
                    "start_year": {"type": "integer"},
                    "end_year": {"type": "integer"},
                }),
                json!(["entity", "sector", "start_year", "end_year"]),
            ),
            example: r#"{"tool": "analyze_emissions_trend", "args": {"entity": "Germany", "sector": "transport", "start_year": 2015, "end_year": 2023}}"#,
        },
        ToolSpec {
            name: ToolName::SmartQueryEmissions,
            description: "Resolve a place name and query with automatic city->admin1->country fallback.",
            schema: object_schema(
                json!({
                    "entity": {"type": "string", "description": "Place name as the user wrote it"},
                    "sector": {"type": "string"},
                    "year": {"type": "integer"},
                    "grain": {"type": "string", "enum": ["year", "month"], "description": "default year"},
                    "level": {"type": "string", "enum": ["country", "admin1", "city"]},
                    "enable_fallback": {"type": "boolean", "description": "default true"},
                }),
                json!(["entity", "sector", "year"]),
            ),
            example: r#"{"tool": "smart_query_emissions", "args": {"entity": "Munich", "sector": "transport", "year": 2023}}"#,
        },
        ToolSpec {
            name: ToolName::GetQualityFilteredData,
            description: "Rows meeting per-row quality thresholds.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string"},
                    "min_quality_score": {"type": "number", "description": "default 85"},
                    "confidence_level": {"type": "string", "enum": ["HIGH", "MEDIUM", "LOW", "ALL"], "description": "default ALL"},
                    "max_uncertainty": {"type": "number", "description": "default 20"},
                    "exclude_synthetic": {"type": "boolean", "description": "default false"},
                    "limit": {"type": "integer"},
                }),
                json!(["file_id"]),
            ),
            example: r#"{"tool": "get_quality_filtered_data", "args": {"file_id": "transport-country-year", "min_quality_score": 90, "confidence_level": "HIGH"}}"#,
        },
        ToolSpec {
            name: ToolName::GetValidatedRecords,
            description: "Rows with their external source list parsed and counted.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string"},
                    "min_sources": {"type": "integer", "description": "default 1"},
                    "location": {"type": "string"},
                    "year": {"type": "integer"},
                    "limit": {"type": "integer"},
                }),
                json!(["file_id"]),
            ),
            example: r#"{"tool": "get_validated_records", "args": {"file_id": "transport-country-year", "min_sources": 2, "location": "Germany"}}"#,
        },
        ToolSpec {
            name: ToolName::GetUncertaintyAnalysis,
            description: "Per-year totals with 95% uncertainty bounds.",
            schema: object_schema(
                json!({
                    "file_id": {"type": "string"},
                    "location": {"type": "string"},
                    "year_start": {"type": "integer"},
                    "year_end": {"type": "integer"},
                    "include_trends": {"type": "boolean", "description": "default true"},
                }),
                json!(["file_id"]),
            ),
            example: r#"{"tool": "get_uncertainty_analysis", "args": {"file_id": "transport-country-year", "location": "Germany", "year_start": 2018, "year_end": 2023}}"#,
        },
        ToolSpec {
            name: ToolName::GetDataQuality,
            description: "Sector quality blocks for every sector in the warehouse.",
            schema: object_schema(json!({}), json!([])),
            example: r#"{"tool": "get_data_quality", "args": {}}"#,
        },
    ]
});

pub fn spec_for(name: ToolName) -> &'static ToolSpec {
    TOOL_SPECS
        .iter()
        .find(|s| s.name == name)
        .expect("every tool has a spec")
}

/// tools/list payload shared byte-for-byte by both transports.
pub fn catalog_listing() -> Value {
    json!({
        "tools": TOOL_SPECS
            .iter()
            .map(|s| {
                json!({
                    "name": s.name.as_str(),
                    "description": s.description,
                    "inputSchema": s.schema,
                })
            })
            .collect::<Vec<_>>()
    })
}

fn object_schema(properties: Value, required: Value) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}
