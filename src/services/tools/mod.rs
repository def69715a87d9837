//! Tool Surface
//!
//! Exposes the query engine as a fixed catalog of named tools. Arguments
//! are validated against the declarative schemas in `spec` before dispatch;
//! dispatch itself is a match over the closed `ToolName` enum. Served over
//! two transports: the stdio JSON-RPC channel (`stdio`) and the HTTP facade
//! (`handlers`), both of which consume this module.

pub mod spec;
pub mod stdio;

pub use spec::{TOOL_SPECS, ToolName, ToolSpec, catalog_listing, spec_for};

use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;

use crate::services::catalog::nearest_matches;
use crate::services::query_engine::{
    AggregateParams, CompareParams, MonthlyTrendsParams, QualityFilteredParams, QueryEngine,
    QueryParams, SeasonalParams, SmartQueryParams, TrendParams, UncertaintyParams,
    ValidatedRecordsParams, YoyParams,
};
use crate::utils::{ApiError, ApiResult};

pub struct ToolSurface {
    engine: Arc<QueryEngine>,
}

impl ToolSurface {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Validate and dispatch one tool call. The returned value is the JSON
    /// payload both transports forward unchanged.
    pub async fn call(&self, name: &str, args: &Value) -> ApiResult<Value> {
        let tool = ToolName::from_str(name).map_err(|_| {
            let nearest =
                nearest_matches(name, ToolName::ALL.iter().map(|t| t.as_str()), 3);
            ApiError::invalid_argument(format!("unknown tool '{}'", name))
                .with_suggestions(nearest)
        })?;
        let spec = spec_for(tool);
        validate_args(spec, args)?;

        let started = std::time::Instant::now();
        let result = self.dispatch(tool, args).await;
        tracing::info!(
            tool = tool.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "tool call"
        );
        result
    }

    async fn dispatch(&self, tool: ToolName, args: &Value) -> ApiResult<Value> {
        match tool {
            ToolName::ListEmissionsDatasets => Ok(self.list_datasets()),
            ToolName::GetDatasetSchema => {
                let file_id = args["file_id"].as_str().unwrap_or_default();
                self.dataset_schema(file_id)
            },
            ToolName::GetDataQuality => Ok(self.data_quality()),
            ToolName::Query => {
                let params: QueryParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.query(&params).await?))
            },
            ToolName::MetricsYoy => {
                let params: YoyParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.yoy(&params).await?))
            },
            ToolName::AnalyzeMonthlyTrends => {
                let params: MonthlyTrendsParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.monthly_trends(&params).await?))
            },
            ToolName::DetectSeasonalPatterns => {
                let params: SeasonalParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.seasonal(&params).await?))
            },
            ToolName::AggregateAcrossSectors => {
                let params: AggregateParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.aggregate_across_sectors(&params).await?))
            },
            ToolName::CompareEmissions => {
                let params: CompareParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.compare(&params).await?))
            },
            ToolName::AnalyzeEmissionsTrend => {
                let params: TrendParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.trend(&params).await?))
            },
            ToolName::SmartQueryEmissions => {
                let params: SmartQueryParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.smart_query(&params).await?))
            },
            ToolName::GetQualityFilteredData => {
                let params: QualityFilteredParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.quality_filtered(&params).await?))
            },
            ToolName::GetValidatedRecords => {
                let params: ValidatedRecordsParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.validated_records(&params).await?))
            },
            ToolName::GetUncertaintyAnalysis => {
                let params: UncertaintyParams = parse_params(tool, args)?;
                Ok(output_json(self.engine.uncertainty_analysis(&params).await?))
            },
        }
    }

    fn list_datasets(&self) -> Value {
        let catalog = self.engine.catalog();
        let datasets: Vec<Value> = catalog
            .list_datasets()
            .into_iter()
            .map(|d| {
                let quality = catalog
                    .sector_quality(d.sector())
                    .map(|q| json!({
                        "quality_score": q.quality_score,
                        "tier": &q.tier,
                        "confidence_tier": q.confidence_tier,
                        "uncertainty_pct": q.uncertainty_pct,
                    }))
                    .unwrap_or(Value::Null);
                json!({
                    "file_id": d.file_id.to_string(),
                    "sector": d.sector(),
                    "level": d.level(),
                    "grain": d.grain(),
                    "start_year": d.start_year,
                    "end_year": d.end_year,
                    "spatial_coverage": &d.spatial_coverage,
                    "per_row_quality": d.has_per_row_quality(),
                    "sector_quality": quality,
                })
            })
            .collect();
        json!({
            "data_version": catalog.data_version(),
            "dataset_count": datasets.len(),
            "datasets": datasets,
        })
    }

    fn dataset_schema(&self, file_id: &str) -> ApiResult<Value> {
        let catalog = self.engine.catalog();
        let dataset = catalog.schema(file_id)?;
        let quality = catalog.sector_quality(dataset.sector())?;
        Ok(json!({
            "file_id": dataset.file_id.to_string(),
            "sector": dataset.sector(),
            "level": dataset.level(),
            "grain": dataset.grain(),
            "physical_table": &dataset.physical_table,
            "columns": &dataset.columns,
            "start_year": dataset.start_year,
            "end_year": dataset.end_year,
            "spatial_coverage": &dataset.spatial_coverage,
            "per_row_quality": dataset.has_per_row_quality(),
            "sector_quality": quality,
            "data_version": catalog.data_version(),
        }))
    }

    fn data_quality(&self) -> Value {
        let catalog = self.engine.catalog();
        let sectors: Vec<Value> = crate::models::Sector::ALL
            .iter()
            .filter_map(|sector| {
                catalog
                    .sector_quality(*sector)
                    .ok()
                    .map(|q| json!({"sector": sector, "quality": q}))
            })
            .collect();
        json!({
            "data_version": catalog.data_version(),
            "sectors": sectors,
        })
    }
}

/// Validate a call's arguments against the tool's declared schema: the
/// argument set must be an object, every key must be a declared canonical
/// name (abbreviations are rejected with the canonical suggestion), required
/// keys must be present and primitive types must match.
pub fn validate_args(spec: &ToolSpec, args: &Value) -> ApiResult<()> {
    let object = args.as_object().ok_or_else(|| {
        ApiError::invalid_argument(format!(
            "arguments for '{}' must be a JSON object",
            spec.name.as_str()
        ))
    })?;

    let properties = spec.property_names();
    for key in object.keys() {
        if !properties.contains(&key.as_str()) {
            let nearest = nearest_matches(key, properties.iter().copied(), 1);
            let mut detail = format!(
                "unknown parameter '{}' for tool '{}'",
                key,
                spec.name.as_str()
            );
            if let Some(canonical) = nearest.first() {
                detail.push_str(&format!("; did you mean '{}'?", canonical));
            }
            return Err(ApiError::invalid_argument(detail).with_suggestions(nearest));
        }
    }

    for required in spec.required_names() {
        if !object.contains_key(required) {
            return Err(ApiError::invalid_argument(format!(
                "missing required parameter '{}' for tool '{}'",
                required,
                spec.name.as_str()
            )));
        }
    }

    if let Some(schema_props) = spec.schema["properties"].as_object() {
        for (key, value) in object {
            let Some(declared) = schema_props.get(key) else { continue };
            let Some(expected) = declared["type"].as_str() else { continue };
            if !type_matches(expected, value) {
                return Err(ApiError::invalid_argument(format!(
                    "parameter '{}' of tool '{}' must be of type {}, got {}",
                    key,
                    spec.name.as_str(),
                    expected,
                    crate::services::query_engine::json_type_name(value)
                )));
            }
            if let Some(allowed) = declared["enum"].as_array()
                && !allowed.contains(value)
            {
                return Err(ApiError::invalid_argument(format!(
                    "parameter '{}' of tool '{}' must be one of {}, got {}",
                    key,
                    spec.name.as_str(),
                    serde_json::to_string(allowed).unwrap_or_default(),
                    value
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(tool: ToolName, args: &Value) -> ApiResult<T> {
    serde_json::from_value(args.clone()).map_err(|e| {
        ApiError::invalid_argument(format!(
            "invalid arguments for '{}': {}",
            tool.as_str(),
            e
        ))
    })
}

fn output_json(output: crate::services::query_engine::ToolOutput) -> Value {
    json!({
        "rows": output.rows,
        "meta": output.meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn abbreviated_parameter_is_rejected_with_canonical_suggestion() {
        let spec = spec_for(ToolName::MetricsYoy);
        let args = json!({
            "file_id": "transport-country-year",
            "key_col": "country_name",
            "base_year": 2020,
            "compare_year": 2023,
        });
        let err = validate_args(spec, &args).unwrap_err();
        assert_eq!(err.kind, crate::utils::ErrorKind::InvalidArgument);
        assert!(err.detail.contains("key_col"));
        assert_eq!(err.suggestions.first().map(String::as_str), Some("key_column"));
    }

    #[test]
    fn missing_required_parameter_is_named() {
        let spec = spec_for(ToolName::MetricsYoy);
        let args = json!({"file_id": "transport-country-year", "key_column": "country_name"});
        let err = validate_args(spec, &args).unwrap_err();
        assert!(err.detail.contains("base_year") || err.detail.contains("compare_year"));
    }

    #[test]
    fn primitive_type_mismatch_is_rejected() {
        let spec = spec_for(ToolName::GetDatasetSchema);
        let err = validate_args(spec, &json!({"file_id": 42})).unwrap_err();
        assert!(err.detail.contains("must be of type string"));
    }

    #[test]
    fn enum_values_are_enforced() {
        let spec = spec_for(ToolName::MetricsYoy);
        let args = json!({
            "file_id": "transport-country-year",
            "key_column": "country_name",
            "base_year": 2020,
            "compare_year": 2023,
            "direction": "down",
        });
        let err = validate_args(spec, &args).unwrap_err();
        assert!(err.detail.contains("direction"));
    }
}
