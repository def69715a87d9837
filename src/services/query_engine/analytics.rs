//! Comparative and Temporal Analytics
//!
//! The operations that go beyond a single filtered scan: entity comparison,
//! trend and CAGR analysis, year-over-year deltas, monthly profiles,
//! seasonality and cross-sector aggregation. All arithmetic happens here on
//! shaped rows; the SQL below is always grouped-and-summed through the
//! shared builder.

use serde_json::{Value, json};

use super::params::{
    AggregateParams, CompareParams, MonthlyTrendsParams, SeasonalParams, TrendParams, YoyParams,
};
use super::validate::{AggFn, Filter, FilterOp, OrderBy, OrderDir, MAX_LIST_ITEMS};
use super::{MAX_LIMIT, QueryEngine, ToolOutput, ValidatedQuery, parse_grain, parse_level, parse_sector, sql};
use crate::models::{FileId, Grain, Sector};
use crate::services::warehouse::{Row, SqlParam};
use crate::utils::{ApiError, ApiResult};

impl QueryEngine {
    /// Compare entities within one sector and year. Unresolved entities are
    /// reported per-item, never dropped silently.
    pub async fn compare(&self, params: &CompareParams) -> ApiResult<ToolOutput> {
        if params.entities.is_empty() {
            return Err(ApiError::invalid_argument("entities must not be empty"));
        }
        if params.entities.len() > MAX_LIST_ITEMS {
            return Err(ApiError::invalid_argument(format!(
                "entities has {} items, maximum is {}",
                params.entities.len(),
                MAX_LIST_ITEMS
            )));
        }
        let sector = parse_sector(&params.sector)?;
        let hint = params.level.as_deref().map(parse_level).transpose()?;

        let mut rows: Vec<Row> = Vec::new();
        let mut unresolved: Vec<Value> = Vec::new();

        for raw in &params.entities {
            match self.resolve_for_sector(raw, sector, Grain::Year, hint) {
                Ok((entity, dataset)) => {
                    let total = self
                        .entity_year_total(dataset, &entity.canonical_name, params.year, "emissions_tonnes")
                        .await?;
                    let mut row = Row::new();
                    row.insert("entity".to_string(), json!(raw));
                    row.insert("canonical_name".to_string(), json!(entity.canonical_name));
                    row.insert("level".to_string(), json!(entity.level));
                    row.insert("year".to_string(), json!(&params.year));
                    row.insert("emissions_tonnes".to_string(), json!(total));
                    rows.push(row);
                },
                Err(e) if e.kind == crate::utils::ErrorKind::EntityUnresolved => {
                    unresolved.push(json!({
                        "entity": raw,
                        "error": "unresolved",
                        "suggestions": e.suggestions,
                    }));
                },
                Err(e) => return Err(e),
            }
        }

        // Ranking over entities that actually have data, highest first.
        let mut ranked: Vec<(String, f64)> = rows
            .iter()
            .filter_map(|r| {
                let name = r.get("canonical_name")?.as_str()?.to_string();
                let value = r.get("emissions_tonnes")?.as_f64()?;
                Some((name, value))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let ranking: Vec<Value> = ranked
            .iter()
            .enumerate()
            .map(|(i, (name, value))| json!({"rank": i + 1, "entity": name, "emissions_tonnes": value}))
            .collect();

        // Pairwise deltas against the highest emitter.
        let deltas: Vec<Value> = match ranked.first() {
            Some((top_name, top_value)) => ranked
                .iter()
                .skip(1)
                .map(|(name, value)| {
                    let absolute = top_value - value;
                    let pct = if *top_value == 0.0 {
                        Value::Null
                    } else {
                        json!(absolute / top_value * 100.0)
                    };
                    json!({
                        "entity": name,
                        "vs": top_name,
                        "absolute_tonnes": absolute,
                        "pct_of_leader": pct,
                    })
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(ToolOutput::new(rows)
            .set("sector", json!(sector))
            .set("year", json!(&params.year))
            .set("ranking", json!(ranking))
            .set("deltas", json!(deltas))
            .set("unresolved", json!(unresolved))
            .set("quality_metadata", self.quality_meta(sector)?))
    }

    /// Yearly series for one entity with total change, CAGR and a pattern
    /// label.
    pub async fn trend(&self, params: &TrendParams) -> ApiResult<ToolOutput> {
        let sector = parse_sector(&params.sector)?;
        let grain = parse_grain(&params.grain)?;
        if grain != Grain::Year {
            return Err(ApiError::grain_mismatch(
                "trend analysis runs on yearly datasets; use analyze_monthly_trends for months",
            ));
        }
        if params.start_year > params.end_year {
            return Err(ApiError::invalid_argument(format!(
                "start_year {} is after end_year {}",
                params.start_year, params.end_year
            )));
        }

        let (entity, dataset) = self.resolve_for_sector(&params.entity, sector, grain, None)?;

        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters: vec![
                Filter {
                    column: dataset.entity_column().to_string(),
                    op: FilterOp::Eq(SqlParam::Text(entity.canonical_name.clone())),
                },
                Filter {
                    column: "year".to_string(),
                    op: FilterOp::Gte(SqlParam::Int(i64::from(params.start_year))),
                },
                Filter {
                    column: "year".to_string(),
                    op: FilterOp::Lte(SqlParam::Int(i64::from(params.end_year))),
                },
            ],
            group_by: vec!["year".to_string()],
            order_by: vec![OrderBy { column: "year".to_string(), dir: OrderDir::Asc }],
            aggregations: vec![(
                "emissions_tonnes".to_string(),
                AggFn::Sum,
                "sum_emissions_tonnes".to_string(),
            )],
            limit: MAX_LIMIT,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let rows = self.gateway().execute_cached(&sql_text, &bind).await?;

        if rows.is_empty() {
            return Err(ApiError::no_data_found(format!(
                "no rows for '{}' in {}-{}",
                entity.canonical_name, params.start_year, params.end_year
            )));
        }

        let series: Vec<(i64, f64)> = rows
            .iter()
            .filter_map(|r| {
                Some((r.get("year")?.as_i64()?, r.get("sum_emissions_tonnes")?.as_f64()?))
            })
            .collect();

        let first = series.first().copied();
        let last = series.last().copied();
        let total_change_pct = match (first, last) {
            (Some((_, f)), Some((_, l))) if f != 0.0 => Some((l - f) / f * 100.0),
            _ => None,
        };
        let cagr_pct = cagr(first, last);
        let pattern = trend_pattern(cagr_pct);

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(dataset.file_id.to_string()))
            .set("entity", json!(entity))
            .set("start_year", json!(&params.start_year))
            .set("end_year", json!(&params.end_year))
            .set("total_change_pct", json!(total_change_pct))
            .set("cagr_pct", json!(cagr_pct))
            .set("pattern", json!(pattern))
            .set("quality_metadata", self.quality_meta(sector)?))
    }

    /// Year-over-year change ranking. Yearly datasets only.
    pub async fn yoy(&self, params: &YoyParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog().schema(&params.file_id)?;
        if dataset.grain() != Grain::Year {
            return Err(ApiError::grain_mismatch(format!(
                "metrics.yoy requires a yearly dataset, '{}' has grain '{}'",
                params.file_id,
                dataset.grain()
            )));
        }
        self.catalog().resolve_columns(
            &params.file_id,
            &[params.key_column.clone(), params.value_column.clone()],
        )?;
        let rank_drops = match params.direction.to_ascii_lowercase().as_str() {
            "drop" => true,
            "rise" => false,
            other => {
                return Err(ApiError::invalid_argument(format!(
                    "direction must be 'drop' or 'rise', got '{}'",
                    other
                )));
            },
        };

        let base = self
            .keyed_year_totals(dataset, &params.key_column, &params.value_column, params.base_year)
            .await?;
        let compare = self
            .keyed_year_totals(dataset, &params.key_column, &params.value_column, params.compare_year)
            .await?;

        let mut changes: Vec<Row> = Vec::new();
        for (key, base_value) in &base {
            let Some(compare_value) = compare.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
            else {
                continue;
            };
            let absolute = compare_value - base_value;
            // Zero base: the percentage is undefined, reported as null.
            let pct = if *base_value == 0.0 { None } else { Some(absolute / base_value * 100.0) };

            let mut row = Row::new();
            row.insert(params.key_column.clone(), json!(key));
            row.insert("base_value".to_string(), json!(base_value));
            row.insert("compare_value".to_string(), json!(compare_value));
            row.insert("abs_change".to_string(), json!(absolute));
            row.insert("pct_change".to_string(), json!(pct));
            changes.push(row);
        }

        changes.sort_by(|a, b| {
            let av = a.get("abs_change").and_then(Value::as_f64).unwrap_or(0.0);
            let bv = b.get("abs_change").and_then(Value::as_f64).unwrap_or(0.0);
            if rank_drops {
                av.partial_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
            }
        });
        changes.truncate(params.top_n.min(MAX_LIMIT as u32) as usize);

        Ok(ToolOutput::new(changes)
            .set("file_id", json!(&params.file_id))
            .set("base_year", json!(&params.base_year))
            .set("compare_year", json!(&params.compare_year))
            .set("direction", json!(&params.direction))
            .set("quality_metadata", self.quality_meta(dataset.sector())?))
    }

    /// Twelve-month profile for one entity-year on a monthly dataset.
    pub async fn monthly_trends(&self, params: &MonthlyTrendsParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog().schema(&params.file_id)?;
        if dataset.grain() != Grain::Month {
            return Err(ApiError::grain_mismatch(format!(
                "analyze_monthly_trends requires a monthly dataset, '{}' has grain '{}'",
                params.file_id,
                dataset.grain()
            )));
        }
        self.catalog().resolve_columns(
            &params.file_id,
            &[params.entity_column.clone(), params.value_column.clone()],
        )?;

        let alias = format!("sum_{}", params.value_column);
        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters: vec![
                Filter {
                    column: params.entity_column.clone(),
                    op: FilterOp::Eq(SqlParam::Text(params.entity_value.clone())),
                },
                Filter {
                    column: "year".to_string(),
                    op: FilterOp::Eq(SqlParam::Int(i64::from(params.year))),
                },
            ],
            group_by: vec!["month".to_string()],
            order_by: vec![OrderBy { column: "month".to_string(), dir: OrderDir::Asc }],
            aggregations: vec![(params.value_column.clone(), AggFn::Sum, alias.clone())],
            limit: 12,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let monthly = self.gateway().execute_cached(&sql_text, &bind).await?;

        if monthly.is_empty() {
            return Err(ApiError::no_data_found(format!(
                "no monthly rows for '{}' = '{}' in {}",
                params.entity_column, params.entity_value, params.year
            ))
            .with_suggestions(vec![
                "check the entity spelling via smart_query_emissions".to_string(),
            ]));
        }

        let year_total: f64 = monthly
            .iter()
            .filter_map(|r| r.get(&alias).and_then(Value::as_f64))
            .sum();

        let mut rows: Vec<Row> = Vec::new();
        let mut peak: Option<(i64, f64)> = None;
        let mut trough: Option<(i64, f64)> = None;
        for r in &monthly {
            let month = r.get("month").and_then(Value::as_i64).unwrap_or(0);
            let value = r.get(&alias).and_then(Value::as_f64).unwrap_or(0.0);
            let share = if year_total == 0.0 { None } else { Some(value / year_total * 100.0) };

            if peak.is_none_or(|(_, v)| value > v) {
                peak = Some((month, value));
            }
            if trough.is_none_or(|(_, v)| value < v) {
                trough = Some((month, value));
            }

            let mut row = Row::new();
            row.insert("month".to_string(), json!(month));
            row.insert("value".to_string(), json!(value));
            row.insert("share_of_year_pct".to_string(), json!(share));
            rows.push(row);
        }

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set("year", json!(&params.year))
            .set("year_total", json!(year_total))
            .set("peak_month", json!(peak.map(|(m, _)| m)))
            .set("trough_month", json!(trough.map(|(m, _)| m)))
            .set("quality_metadata", self.quality_meta(dataset.sector())?))
    }

    /// Per-month aggregates across several years plus a seasonality score
    /// (coefficient of variation across monthly totals).
    pub async fn seasonal(&self, params: &SeasonalParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog().schema(&params.file_id)?;
        if dataset.grain() != Grain::Month {
            return Err(ApiError::grain_mismatch(format!(
                "detect_seasonal_patterns requires a monthly dataset, '{}' has grain '{}'",
                params.file_id,
                dataset.grain()
            )));
        }
        if params.years.is_empty() {
            return Err(ApiError::invalid_argument("years must not be empty"));
        }
        if params.years.len() > MAX_LIST_ITEMS {
            return Err(ApiError::invalid_argument(format!(
                "years has {} items, maximum is {}",
                params.years.len(),
                MAX_LIST_ITEMS
            )));
        }
        self.catalog()
            .resolve_columns(&params.file_id, &[params.entity_column.clone()])?;

        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters: vec![
                Filter {
                    column: params.entity_column.clone(),
                    op: FilterOp::Eq(SqlParam::Text(params.entity_value.clone())),
                },
                Filter {
                    column: "year".to_string(),
                    op: FilterOp::In(
                        params.years.iter().map(|y| SqlParam::Int(i64::from(*y))).collect(),
                    ),
                },
            ],
            group_by: vec!["month".to_string()],
            order_by: vec![OrderBy { column: "month".to_string(), dir: OrderDir::Asc }],
            aggregations: vec![(
                "emissions_tonnes".to_string(),
                AggFn::Sum,
                "sum_emissions_tonnes".to_string(),
            )],
            limit: 12,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let monthly = self.gateway().execute_cached(&sql_text, &bind).await?;

        if monthly.is_empty() {
            return Err(ApiError::no_data_found(format!(
                "no monthly rows for '{}' = '{}' in the requested years",
                params.entity_column, params.entity_value
            )));
        }

        let totals: Vec<f64> = monthly
            .iter()
            .filter_map(|r| r.get("sum_emissions_tonnes").and_then(Value::as_f64))
            .collect();
        let score = coefficient_of_variation(&totals);

        let year_count = params.years.len() as f64;
        let rows: Vec<Row> = monthly
            .iter()
            .map(|r| {
                let month = r.get("month").and_then(Value::as_i64).unwrap_or(0);
                let total = r.get("sum_emissions_tonnes").and_then(Value::as_f64).unwrap_or(0.0);
                let mut row = Row::new();
                row.insert("month".to_string(), json!(month));
                row.insert("total_value".to_string(), json!(total));
                row.insert("avg_value".to_string(), json!(total / year_count));
                row
            })
            .collect();

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set("years", json!(&params.years))
            .set("seasonality_score", json!(score))
            .set("quality_metadata", self.quality_meta(dataset.sector())?))
    }

    /// Sum one entity-year across sectors. Sectors without data are
    /// reported, never imputed.
    pub async fn aggregate_across_sectors(&self, params: &AggregateParams) -> ApiResult<ToolOutput> {
        let sectors: Vec<Sector> = match &params.sectors {
            Value::String(s) if s.eq_ignore_ascii_case("all") => Sector::ALL.to_vec(),
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(ApiError::invalid_argument("sectors must not be empty"));
                }
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let name = item.as_str().ok_or_else(|| {
                        ApiError::invalid_argument(format!(
                            "sectors[{}] must be a sector name string",
                            index
                        ))
                    })?;
                    out.push(parse_sector(name)?);
                }
                out
            },
            other => {
                return Err(ApiError::invalid_argument(format!(
                    "sectors must be \"all\" or a list of sector names, got {}",
                    super::validate::type_name(other)
                )));
            },
        };

        let hint = params.level.as_deref().map(parse_level).transpose()?;
        let entity = self.resolver().normalise(&params.entity, hint)?;
        let level = entity.level;

        let mut per_sector: Vec<Row> = Vec::new();
        let mut sectors_with_data: Vec<Sector> = Vec::new();
        let mut sectors_missing: Vec<Sector> = Vec::new();
        let mut quality_blocks: Vec<Value> = Vec::new();
        let mut total = 0.0;

        for sector in &sectors {
            let Some(dataset) = self.catalog().dataset_for(*sector, level, Grain::Year) else {
                sectors_missing.push(*sector);
                continue;
            };
            let value = self
                .entity_year_total(dataset, &entity.canonical_name, params.year, "emissions_tonnes")
                .await?;
            match value {
                Some(v) => {
                    total += v;
                    sectors_with_data.push(*sector);
                    quality_blocks.push(self.quality_meta(*sector)?);
                    let mut row = Row::new();
                    row.insert("sector".to_string(), json!(sector));
                    row.insert("emissions_tonnes".to_string(), json!(v));
                    row.insert(
                        "file_id".to_string(),
                        json!(FileId::new(*sector, level, Grain::Year).to_string()),
                    );
                    per_sector.push(row);
                },
                None => sectors_missing.push(*sector),
            }
        }

        if sectors_with_data.is_empty() {
            return Err(ApiError::no_data_found(format!(
                "no sector data for '{}' at level '{}' in {}",
                entity.canonical_name, level, params.year
            )));
        }

        Ok(ToolOutput::new(per_sector)
            .set("entity", json!(entity))
            .set("level", json!(level))
            .set("year", json!(&params.year))
            .set("total_tonnes", json!(total))
            .set("total_mtco2", json!(total / 1_000_000.0))
            .set("sectors_with_data", json!(sectors_with_data))
            .set("sectors_missing", json!(sectors_missing))
            .set("quality_metadata", json!(quality_blocks)))
    }

    /// Per-key yearly totals used by the YoY ranking.
    async fn keyed_year_totals(
        &self,
        dataset: &crate::models::DatasetDescriptor,
        key_column: &str,
        value_column: &str,
        year: i32,
    ) -> ApiResult<Vec<(String, f64)>> {
        let alias = format!("sum_{}", value_column);
        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters: vec![Filter {
                column: "year".to_string(),
                op: FilterOp::Eq(SqlParam::Int(i64::from(year))),
            }],
            group_by: vec![key_column.to_string()],
            order_by: Vec::new(),
            aggregations: vec![(value_column.to_string(), AggFn::Sum, alias.clone())],
            limit: MAX_LIMIT,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql_text, bind) = sql::build_select(&validated);
        let rows = self.gateway().execute_cached(&sql_text, &bind).await?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                Some((
                    r.get(key_column)?.as_str()?.to_string(),
                    r.get(&alias)?.as_f64()?,
                ))
            })
            .collect())
    }
}

/// Compound annual growth rate in percent between the first and last series
/// points. `None` when it is undefined (zero/negative endpoints or a single
/// point).
pub fn cagr(first: Option<(i64, f64)>, last: Option<(i64, f64)>) -> Option<f64> {
    let (first_year, first_value) = first?;
    let (last_year, last_value) = last?;
    let span = (last_year - first_year) as f64;
    if span <= 0.0 || first_value <= 0.0 || last_value <= 0.0 {
        return None;
    }
    Some(((last_value / first_value).powf(1.0 / span) - 1.0) * 100.0)
}

/// |CAGR| < 1% -> stable; CAGR > 0 -> increasing; else decreasing.
pub fn trend_pattern(cagr_pct: Option<f64>) -> &'static str {
    match cagr_pct {
        Some(c) if c.abs() < 1.0 => "stable",
        Some(c) if c > 0.0 => "increasing",
        Some(_) => "decreasing",
        None => "stable",
    }
}

/// Coefficient of variation (stddev / mean). `None` for an empty or
/// zero-mean series.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return None;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cagr_matches_hand_computation() {
        // 100 -> 121 over 2 years is 10% per year.
        let c = cagr(Some((2020, 100.0)), Some((2022, 121.0))).unwrap();
        assert!((c - 10.0).abs() < 1e-9);
    }

    #[test]
    fn cagr_undefined_for_zero_base_or_single_point() {
        assert!(cagr(Some((2020, 0.0)), Some((2022, 50.0))).is_none());
        assert!(cagr(Some((2020, 10.0)), Some((2020, 10.0))).is_none());
        assert!(cagr(None, Some((2022, 50.0))).is_none());
    }

    #[test]
    fn pattern_thresholds() {
        assert_eq!(trend_pattern(Some(0.5)), "stable");
        assert_eq!(trend_pattern(Some(-0.99)), "stable");
        assert_eq!(trend_pattern(Some(1.5)), "increasing");
        assert_eq!(trend_pattern(Some(-2.0)), "decreasing");
        assert_eq!(trend_pattern(None), "stable");
    }

    #[test]
    fn coefficient_of_variation_flat_series_is_zero() {
        let score = coefficient_of_variation(&[5.0, 5.0, 5.0]).unwrap();
        assert!(score.abs() < 1e-12);
        assert!(coefficient_of_variation(&[]).is_none());
    }
}
