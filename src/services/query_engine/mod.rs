//! Query Engine
//!
//! Translates validated tool arguments into parameterised SQL, executes
//! through the warehouse gateway and shapes results. The engine owns the
//! gateway and the entity resolver; callers above it never touch SQL.
//!
//! Layout mirrors the per-concern split of the analytical rules:
//! `validate` (argument shapes), `sql` (generation), `analytics`
//! (comparative/temporal operations), `quality` (quality-aware operations).

mod analytics;
mod params;
mod quality;
mod sql;
mod validate;

pub use params::*;
pub use validate::{
    DEFAULT_LIMIT, MAX_LIMIT, MAX_STRING_LEN, ValidatedQuery, type_name as json_type_name,
    validate_query,
};

use serde_json::{Map, Value, json};
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{
    DatasetDescriptor, FallbackStatus, FallbackStep, FallbackTrace, FileId, Grain, Level,
    ResolvedEntity, Sector,
};
use crate::services::catalog::Catalog;
use crate::services::resolver::EntityResolver;
use crate::services::warehouse::{Row, SqlParam, WarehouseGateway};
use crate::utils::{ApiError, ApiResult};

use validate::{Filter, FilterOp, OrderBy, OrderDir};

/// Uniform operation output: shaped rows plus a metadata mapping. Meta
/// always carries `file_id` (when a single dataset was queried),
/// `row_count` and `quality_metadata`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolOutput {
    pub rows: Vec<Row>,
    pub meta: Map<String, Value>,
}

impl ToolOutput {
    fn new(rows: Vec<Row>) -> Self {
        let mut meta = Map::new();
        meta.insert("row_count".to_string(), json!(rows.len()));
        Self { rows, meta }
    }

    fn set(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    fn set_warnings(mut self, warnings: Vec<String>, suggestions: Vec<String>) -> Self {
        if !warnings.is_empty() {
            self.meta.insert("warnings".to_string(), json!(warnings));
        }
        if !suggestions.is_empty() {
            self.meta.insert("suggestions".to_string(), json!(suggestions));
        }
        self
    }
}

pub struct QueryEngine {
    catalog: Arc<Catalog>,
    resolver: Arc<EntityResolver>,
    gateway: Arc<WarehouseGateway>,
}

impl QueryEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        resolver: Arc<EntityResolver>,
        gateway: Arc<WarehouseGateway>,
    ) -> Self {
        Self { catalog, resolver, gateway }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn gateway(&self) -> &WarehouseGateway {
        &self.gateway
    }

    /// General `query` operation.
    pub async fn query(&self, params: &QueryParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog.schema(&params.file_id)?;
        let validated = validate_query(dataset, params)?;
        let (sql, bind) = sql::build_select(&validated);

        tracing::debug!(file_id = %params.file_id, sql = %sql, "query built");
        let rows = self.gateway.execute_cached(&sql, &bind).await?;

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set("quality_metadata", self.quality_meta(dataset.sector())?)
            .set_warnings(validated.warnings, validated.suggestions))
    }

    /// Rank entities by a measure within one year. For monthly datasets the
    /// measure is summed over the year first.
    pub async fn top_n(&self, params: &TopNParams) -> ApiResult<ToolOutput> {
        let dataset = self.catalog.schema(&params.file_id)?;
        let direction = OrderDir::parse(&params.direction)?;
        self.catalog.resolve_columns(
            &params.file_id,
            &[params.key_column.clone(), params.value_column.clone()],
        )?;
        require_year_column(dataset)?;

        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();
        if !dataset.covers_year(params.year) {
            warnings.push(format!(
                "year {} is outside coverage {}-{}",
                params.year, dataset.start_year, dataset.end_year
            ));
            suggestions.push(format!("nearest available year: {}", dataset.nearest_year(params.year)));
        }

        let n = i64::from(params.n).clamp(0, MAX_LIMIT);
        let alias = format!("sum_{}", params.value_column);
        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters: vec![Filter {
                column: "year".to_string(),
                op: FilterOp::Eq(SqlParam::Int(i64::from(params.year))),
            }],
            group_by: vec![params.key_column.clone()],
            order_by: vec![OrderBy { column: alias.clone(), dir: direction }],
            aggregations: vec![(params.value_column.clone(), validate::AggFn::Sum, alias)],
            limit: n,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql, bind) = sql::build_select(&validated);
        let rows = self.gateway.execute_cached(&sql, &bind).await?;

        Ok(ToolOutput::new(rows)
            .set("file_id", json!(&params.file_id))
            .set("year", json!(&params.year))
            .set("quality_metadata", self.quality_meta(dataset.sector())?)
            .set_warnings(warnings, suggestions))
    }

    /// Resolution plus cascade: probe the detected level, then fall back
    /// city -> admin1 -> country, recording every attempt.
    pub async fn smart_query(&self, params: &SmartQueryParams) -> ApiResult<ToolOutput> {
        let sector = parse_sector(&params.sector)?;
        let grain = parse_grain(&params.grain)?;
        let hint = params
            .level
            .as_deref()
            .map(parse_level)
            .transpose()?;

        let entity = self.resolver.normalise(&params.entity, hint)?;
        let requested_level = entity.level;

        let targets: Vec<(Level, Option<String>)> = if params.enable_fallback {
            self.resolver.cascade_targets(&entity.canonical_name, entity.level)
        } else {
            vec![(entity.level, Some(entity.canonical_name.clone()))]
        };

        let mut trace: FallbackTrace = Vec::new();
        for (level, name) in targets {
            let Some(name) = name else {
                trace.push(FallbackStep {
                    level,
                    status: FallbackStatus::UnknownEntity,
                    entity: entity.canonical_name.clone(),
                });
                continue;
            };
            let Some(dataset) = self.catalog.dataset_for(sector, level, grain) else {
                trace.push(FallbackStep {
                    level,
                    status: FallbackStatus::DatasetMissing,
                    entity: name,
                });
                continue;
            };

            let rows = self
                .entity_year_rows(dataset, &name, params.year, DEFAULT_LIMIT)
                .await?;
            if rows.is_empty() {
                trace.push(FallbackStep { level, status: FallbackStatus::NoData, entity: name });
                continue;
            }

            trace.push(FallbackStep {
                level,
                status: FallbackStatus::Ok,
                entity: name.clone(),
            });
            let file_id = FileId::new(sector, level, grain);
            return Ok(ToolOutput::new(rows)
                .set("file_id", json!(file_id.to_string()))
                .set("requested_level", json!(requested_level))
                .set("actual_level", json!(level))
                .set("resolved_entity", json!(entity))
                .set("fallback_trace", json!(trace))
                .set("quality_metadata", self.quality_meta(sector)?));
        }

        // Zero rows everywhere: report honestly with the trace; the caller
        // decides how to phrase it. Numbers are never invented here.
        let warning = format!(
            "no data for '{}' in sector '{}' at any geographic level for {}",
            entity.canonical_name, sector, params.year
        );
        Ok(ToolOutput::new(Vec::new())
            .set("requested_level", json!(requested_level))
            .set("actual_level", json!(null))
            .set("resolved_entity", json!(entity))
            .set("fallback_trace", json!(trace))
            .set("quality_metadata", self.quality_meta(sector)?)
            .set_warnings(vec![warning], vec!["try a different year or sector".to_string()]))
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(crate) fn quality_meta(&self, sector: Sector) -> ApiResult<Value> {
        Ok(serde_json::to_value(self.catalog.quality_metadata(sector)?)
            .unwrap_or(Value::Null))
    }

    /// All rows for one entity in one year.
    async fn entity_year_rows(
        &self,
        dataset: &DatasetDescriptor,
        entity_name: &str,
        year: i32,
        limit: i64,
    ) -> ApiResult<Vec<Row>> {
        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: dataset.columns.iter().map(|c| c.name.clone()).collect(),
            filters: vec![
                Filter {
                    column: dataset.entity_column().to_string(),
                    op: FilterOp::Eq(SqlParam::Text(entity_name.to_string())),
                },
                Filter {
                    column: "year".to_string(),
                    op: FilterOp::Eq(SqlParam::Int(i64::from(year))),
                },
            ],
            group_by: Vec::new(),
            order_by: Vec::new(),
            aggregations: Vec::new(),
            limit,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql, bind) = sql::build_select(&validated);
        self.gateway.execute_cached(&sql, &bind).await
    }

    /// Summed measure for one entity in one year. `None` when the dataset
    /// has no rows for the pair.
    pub(crate) async fn entity_year_total(
        &self,
        dataset: &DatasetDescriptor,
        entity_name: &str,
        year: i32,
        value_column: &str,
    ) -> ApiResult<Option<f64>> {
        let alias = format!("sum_{}", value_column);
        let validated = ValidatedQuery {
            table: dataset.physical_table.clone(),
            select: Vec::new(),
            filters: vec![
                Filter {
                    column: dataset.entity_column().to_string(),
                    op: FilterOp::Eq(SqlParam::Text(entity_name.to_string())),
                },
                Filter {
                    column: "year".to_string(),
                    op: FilterOp::Eq(SqlParam::Int(i64::from(year))),
                },
            ],
            group_by: vec![dataset.entity_column().to_string()],
            order_by: Vec::new(),
            aggregations: vec![(value_column.to_string(), validate::AggFn::Sum, alias.clone())],
            limit: 1,
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };
        let (sql, bind) = sql::build_select(&validated);
        let rows = self.gateway.execute_cached(&sql, &bind).await?;
        Ok(rows.first().and_then(|r| r.get(&alias)).and_then(Value::as_f64))
    }

    /// Resolve an entity and find the dataset for its level, honouring an
    /// optional level hint.
    pub(crate) fn resolve_for_sector(
        &self,
        raw_entity: &str,
        sector: Sector,
        grain: Grain,
        level_hint: Option<Level>,
    ) -> ApiResult<(ResolvedEntity, &DatasetDescriptor)> {
        let entity = self.resolver.normalise(raw_entity, level_hint)?;
        let dataset = self
            .catalog
            .dataset_for(sector, entity.level, grain)
            .ok_or_else(|| {
                ApiError::unknown_dataset(
                    &FileId::new(sector, entity.level, grain).to_string(),
                    Vec::new(),
                )
            })?;
        Ok((entity, dataset))
    }
}

fn require_year_column(dataset: &DatasetDescriptor) -> ApiResult<()> {
    if dataset.has_column("year") {
        Ok(())
    } else {
        Err(ApiError::invalid_argument(format!(
            "dataset '{}' has no 'year' column",
            dataset.file_id
        )))
    }
}

pub(crate) fn parse_sector(s: &str) -> ApiResult<Sector> {
    Sector::from_str(s).map_err(|_| {
        let nearest =
            crate::services::catalog::nearest_matches(s, Sector::ALL.iter().map(|x| x.as_str()), 3);
        ApiError::invalid_argument(format!("unknown sector '{}'", s)).with_suggestions(nearest)
    })
}

pub(crate) fn parse_level(s: &str) -> ApiResult<Level> {
    Level::from_str(s)
        .map_err(|_| ApiError::invalid_argument(format!(
            "unknown level '{}'; expected country, admin1 or city",
            s
        )))
}

pub(crate) fn parse_grain(s: &str) -> ApiResult<Grain> {
    Grain::from_str(s)
        .map_err(|_| ApiError::invalid_argument(format!(
            "unknown grain '{}'; expected year or month",
            s
        )))
}
