//! Quality-Aware Operations
//!
//! Filtering on per-row quality columns, validated-record extraction and
//! uncertainty analysis. Per-row quality columns are feature-detected per
//! dataset; where a table does not carry them, callers are pointed at the
//! sector quality block instead of getting fabricated numbers.

use serde_json::{Value, json};
use std::str::FromStr;

use super::params::{QualityFilteredParams, UncertaintyParams, ValidatedRecordsParams};
use super::validate::{AggFn, Filter, FilterOp, OrderBy, OrderDir, parse_limit};
use super::{MAX_LIMIT, QueryEngine, ToolOutput, ValidatedQuery, sql};
use crate::models::{ConfidenceTier, DatasetDescriptor};
use crate::services::warehouse::{Row, SqlParam};
use crate::utils::{ApiError, ApiResult};

impl QueryEngine {
    /// Rows meeting quality thresholds. Requires the per-row quality
    /// columns.
    pub async fn quality_filtered(&self, params: &QualityFilteredParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog().schema(&params.file_id)?;
        require_columns(
            dataset,
            &["quality_score", "confidence_level", "uncertainty_pct", "is_synthetic"],
        )?;

        let mut warnings = Vec::new();
        let limit = parse_limit(&params.limit, &mut warnings)?;

        let mut filters = vec![
            Filter {
                column: "quality_score".to_string(),
                op: FilterOp::Gte(SqlParam::Float(params.min_quality_score)),
            },
            Filter {
                column: "uncertainty_pct".to_string(),
                op: FilterOp::Lte(SqlParam::Float(params.max_uncertainty)),
            },
        ];
        if !params.confidence_level.eq_ignore_ascii_case("ALL") {
            let tier = ConfidenceTier::from_str(&params.confidence_level).map_err(|_| {
                ApiError::invalid_argument(format!(
                    "confidence_level must be HIGH, MEDIUM, LOW or ALL, got '{}'",
                    params.confidence_level
                ))
            })?;
            filters.push(Filter {
                column: "confidence_level".to_string(),
                op: FilterOp::Eq(SqlParam::Text(tier.as_str().to_string())),
            });
        }
        if params.exclude_synthetic {
            filters.push(Filter {
                column: "is_synthetic".to_string(),
                op: FilterOp::Eq(SqlParam::Int(0)),
            });
        }

        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: dataset.columns.iter().map(|c| c.name.clone()).collect(),
            filters,
            group_by: Vec::new(),
            order_by: vec![OrderBy { column: "quality_score".to_string(), dir: OrderDir::Desc }],
            aggregations: Vec::new(),
            limit,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let rows = self.gateway().execute_cached(&sql_text, &bind).await?;

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set(
                "applied_filters",
                json!({
                    "min_quality_score": params.min_quality_score,
                    "confidence_level": &params.confidence_level,
                    "max_uncertainty": params.max_uncertainty,
                    "exclude_synthetic": params.exclude_synthetic,
                }),
            )
            .set("quality_metadata", self.quality_meta(dataset.sector())?)
            .set_warnings(warnings, Vec::new()))
    }

    /// Rows with their pipe-delimited `data_source` split into a parsed
    /// source list, filtered on a minimum source count.
    pub async fn validated_records(&self, params: &ValidatedRecordsParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog().schema(&params.file_id)?;
        require_columns(dataset, &["data_source", "validation_status"])?;

        let mut warnings = Vec::new();
        let limit = parse_limit(&params.limit, &mut warnings)?;

        let mut filters = Vec::new();
        if let Some(location) = &params.location {
            let entity = self.resolver().normalise(location, None)?;
            filters.push(Filter {
                column: dataset.entity_column().to_string(),
                op: FilterOp::Eq(SqlParam::Text(entity.canonical_name)),
            });
        }
        if let Some(year) = params.year {
            filters.push(Filter {
                column: "year".to_string(),
                op: FilterOp::Eq(SqlParam::Int(i64::from(year))),
            });
        }

        // The source-count filter runs on parsed lists, so fetch up to the
        // hard cap and trim afterwards.
        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: dataset.columns.iter().map(|c| c.name.clone()).collect(),
            filters,
            group_by: Vec::new(),
            order_by: Vec::new(),
            aggregations: Vec::new(),
            limit: MAX_LIMIT,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let fetched = self.gateway().execute_cached(&sql_text, &bind).await?;

        let mut rows: Vec<Row> = Vec::new();
        for mut row in fetched {
            let sources = parse_source_list(row.get("data_source"));
            if (sources.len() as u32) < params.min_sources {
                continue;
            }
            row.insert("sources".to_string(), json!(sources));
            row.insert("source_count".to_string(), json!(sources.len()));
            rows.push(row);
            if rows.len() as i64 >= limit {
                break;
            }
        }

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set("min_sources", json!(&params.min_sources))
            .set("quality_metadata", self.quality_meta(dataset.sector())?)
            .set_warnings(warnings, Vec::new()))
    }

    /// Per-year aggregates with 95% bounds. Uses per-row bounds when the
    /// dataset carries them, otherwise the sector block's uncertainty.
    pub async fn uncertainty_analysis(&self, params: &UncertaintyParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog().schema(&params.file_id)?;
        let per_row_bounds =
            dataset.has_column("uncertainty_low") && dataset.has_column("uncertainty_high");

        let year_start = params.year_start.unwrap_or(dataset.start_year);
        let year_end = params.year_end.unwrap_or(dataset.end_year);
        if year_start > year_end {
            return Err(ApiError::invalid_argument(format!(
                "year_start {} is after year_end {}",
                year_start, year_end
            )));
        }

        let mut filters = vec![
            Filter {
                column: "year".to_string(),
                op: FilterOp::Gte(SqlParam::Int(i64::from(year_start))),
            },
            Filter {
                column: "year".to_string(),
                op: FilterOp::Lte(SqlParam::Int(i64::from(year_end))),
            },
        ];
        if let Some(location) = &params.location {
            let entity = self.resolver().normalise(location, None)?;
            filters.push(Filter {
                column: dataset.entity_column().to_string(),
                op: FilterOp::Eq(SqlParam::Text(entity.canonical_name)),
            });
        }

        let mut aggregations = vec![(
            "emissions_tonnes".to_string(),
            AggFn::Sum,
            "sum_emissions_tonnes".to_string(),
        )];
        if per_row_bounds {
            aggregations.push((
                "uncertainty_low".to_string(),
                AggFn::Sum,
                "sum_uncertainty_low".to_string(),
            ));
            aggregations.push((
                "uncertainty_high".to_string(),
                AggFn::Sum,
                "sum_uncertainty_high".to_string(),
            ));
        }

        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters,
            group_by: vec!["year".to_string()],
            order_by: vec![OrderBy { column: "year".to_string(), dir: OrderDir::Asc }],
            aggregations,
            limit: MAX_LIMIT,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let yearly = self.gateway().execute_cached(&sql_text, &bind).await?;

        if yearly.is_empty() {
            return Err(ApiError::no_data_found(format!(
                "no rows in {}-{} for uncertainty analysis",
                year_start, year_end
            )));
        }

        let sector_uncertainty =
            self.catalog().sector_quality(dataset.sector())?.uncertainty_pct;

        let mut rows: Vec<Row> = Vec::new();
        let mut series: Vec<(i64, f64)> = Vec::new();
        for r in &yearly {
            let year = r.get("year").and_then(Value::as_i64).unwrap_or(0);
            let value = r.get("sum_emissions_tonnes").and_then(Value::as_f64).unwrap_or(0.0);
            let (low, high) = if per_row_bounds {
                (
                    r.get("sum_uncertainty_low").and_then(Value::as_f64).unwrap_or(value),
                    r.get("sum_uncertainty_high").and_then(Value::as_f64).unwrap_or(value),
                )
            } else {
                (
                    value * (1.0 - sector_uncertainty / 100.0),
                    value * (1.0 + sector_uncertainty / 100.0),
                )
            };
            series.push((year, value));

            let mut row = Row::new();
            row.insert("year".to_string(), json!(year));
            row.insert("emissions_tonnes".to_string(), json!(value));
            row.insert("lower_bound_95".to_string(), json!(low));
            row.insert("upper_bound_95".to_string(), json!(high));
            rows.push(row);
        }

        let mut output = ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set("year_start", json!(year_start))
            .set("year_end", json!(year_end))
            .set("bounds_source", json!(if per_row_bounds { "per_row" } else { "sector_block" }))
            .set("quality_metadata", self.quality_meta(dataset.sector())?);

        if params.include_trends {
            let first = series.first().copied();
            let last = series.last().copied();
            let cagr = super::analytics::cagr(first, last);
            output = output
                .set("cagr_pct", json!(cagr))
                .set("pattern", json!(super::analytics::trend_pattern(cagr)));
        }

        Ok(output)
    }
}

fn require_columns(dataset: &DatasetDescriptor, needed: &[&str]) -> ApiResult<()> {
    let missing: Vec<&str> = needed
        .iter()
        .copied()
        .filter(|c| !dataset.has_column(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::invalid_argument(format!(
            "dataset '{}' carries no per-row quality columns ({} missing); \
             use get_data_quality for its sector-level quality block",
            dataset.file_id,
            missing.join(", ")
        )))
    }
}

/// Split a pipe-delimited source string into trimmed, non-empty names.
pub fn parse_source_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_str)
        .map(|s| {
            s.split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
