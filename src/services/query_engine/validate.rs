//! Query Validation
//!
//! Turns raw tool arguments into a `ValidatedQuery` that only references
//! declared columns and bindable values. Shape errors are caught here with
//! precise positions; nothing relies on the warehouse rejecting bad SQL.

use serde_json::Value;

use super::params::QueryParams;
use crate::models::{ColumnKind, DatasetDescriptor};
use crate::services::catalog::nearest_matches;
use crate::services::warehouse::SqlParam;
use crate::utils::{ApiError, ApiResult};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 1000;
pub const MAX_COLUMNS: usize = 50;
pub const MAX_FILTERS: usize = 20;
pub const MAX_LIST_ITEMS: usize = 100;
pub const MAX_ARGS_BYTES: usize = 10_000;
pub const MAX_STRING_LEN: usize = 500;

/// A single validated filter.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone)]
pub enum FilterOp {
    Eq(SqlParam),
    In(Vec<SqlParam>),
    Gte(SqlParam),
    Lte(SqlParam),
    Gt(SqlParam),
    Lt(SqlParam),
    Contains(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> ApiResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ApiError::invalid_argument(format!(
                "direction must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub dir: OrderDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggFn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
        }
    }

    fn parse(s: &str) -> ApiResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUM" => Ok(Self::Sum),
            "AVG" => Ok(Self::Avg),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            "COUNT" => Ok(Self::Count),
            other => Err(ApiError::invalid_argument(format!(
                "aggregation must be one of SUM|AVG|MIN|MAX|COUNT, got '{}'",
                other
            ))),
        }
    }

    /// SUM and AVG only make sense over numeric columns.
    fn requires_numeric(&self) -> bool {
        matches!(self, Self::Sum | Self::Avg)
    }
}

/// Fully validated query, ready for SQL generation.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub table: String,
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    /// (column, function, alias)
    pub aggregations: Vec<(String, AggFn, String)>,
    pub limit: i64,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Validate a full `query` argument set against a dataset descriptor.
pub fn validate_query(dataset: &DatasetDescriptor, params: &QueryParams) -> ApiResult<ValidatedQuery> {
    check_args_size(params)?;

    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    let select = match &params.select {
        Some(value) => parse_column_list(dataset, value, "select")?,
        None => Vec::new(),
    };

    let filters = match &params.r#where {
        Some(value) => parse_where(dataset, value)?,
        None => Vec::new(),
    };

    let group_by = match &params.group_by {
        Some(value) => parse_column_list(dataset, value, "group_by")?,
        None => Vec::new(),
    };

    let aggregations = match &params.aggregations {
        Some(value) => parse_aggregations(dataset, value)?,
        None => Vec::new(),
    };

    let agg_aliases: Vec<&str> = aggregations.iter().map(|(_, _, a)| a.as_str()).collect();
    let order_by = match &params.order_by {
        Some(value) => parse_order_by(dataset, value, &agg_aliases)?,
        None => Vec::new(),
    };

    let limit = parse_limit(&params.limit, &mut warnings)?;

    let total_columns =
        select.len() + group_by.len() + order_by.len() + aggregations.len();
    if total_columns > MAX_COLUMNS {
        return Err(ApiError::invalid_argument(format!(
            "query references {} columns, maximum is {}",
            total_columns, MAX_COLUMNS
        )));
    }
    if filters.len() > MAX_FILTERS {
        return Err(ApiError::invalid_argument(format!(
            "query has {} filters, maximum is {}",
            filters.len(),
            MAX_FILTERS
        )));
    }
    if !group_by.is_empty() && aggregations.is_empty() {
        return Err(ApiError::invalid_argument(
            "group_by requires at least one aggregation",
        ));
    }

    // Pre-execution heuristics: out-of-coverage years and unfiltered scans
    // warn but do not fail.
    coverage_check(dataset, &filters, &mut warnings, &mut suggestions);
    if filters.is_empty() && aggregations.is_empty() {
        warnings.push(format!(
            "no filters supplied; returning a sample of at most {} rows",
            limit
        ));
    }

    // An empty select means every declared column.
    let select = if select.is_empty() && aggregations.is_empty() {
        dataset.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        select
    };

    Ok(ValidatedQuery {
        table: dataset.physical_table.clone(),
        select,
        filters,
        group_by,
        order_by,
        aggregations,
        limit,
        warnings,
        suggestions,
    })
}

fn check_args_size(params: &QueryParams) -> ApiResult<()> {
    let serialised = serde_json::to_string(&serde_json::json!({
        "file_id": params.file_id,
        "select": params.select,
        "where": params.r#where,
        "group_by": params.group_by,
        "order_by": params.order_by,
        "aggregations": params.aggregations,
        "limit": params.limit,
    }))
    .unwrap_or_default();
    if serialised.len() > MAX_ARGS_BYTES {
        return Err(ApiError::invalid_argument(format!(
            "query arguments are {} bytes serialised, maximum is {}",
            serialised.len(),
            MAX_ARGS_BYTES
        )));
    }
    Ok(())
}

/// Parse a flat list of declared column names. Nested containers fail with
/// the offending index and expected type.
pub fn parse_column_list(
    dataset: &DatasetDescriptor,
    value: &Value,
    field: &str,
) -> ApiResult<Vec<String>> {
    let items = value.as_array().ok_or_else(|| {
        ApiError::invalid_argument(format!(
            "{} must be a flat list of column names, got {}",
            field,
            type_name(value)
        ))
    })?;
    if items.len() > MAX_LIST_ITEMS {
        return Err(ApiError::invalid_argument(format!(
            "{} has {} items, maximum is {}",
            field,
            items.len(),
            MAX_LIST_ITEMS
        )));
    }

    let mut columns = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let name = item.as_str().ok_or_else(|| {
            ApiError::invalid_argument(format!(
                "{}[{}] must be a string column name, got {}",
                field,
                index,
                type_name(item)
            ))
        })?;
        if !dataset.has_column(name) {
            let nearest = nearest_matches(name, dataset.column_names().into_iter(), 3);
            return Err(ApiError::unknown_column(name, nearest));
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}

/// Parse the `where` mapping: scalars, flat membership lists, or range
/// objects with keys from {gte, lte, gt, lt, in, contains}.
pub fn parse_where(dataset: &DatasetDescriptor, value: &Value) -> ApiResult<Vec<Filter>> {
    let object = value.as_object().ok_or_else(|| {
        ApiError::invalid_argument(format!(
            "where must be an object mapping columns to conditions, got {}",
            type_name(value)
        ))
    })?;

    let mut filters = Vec::with_capacity(object.len());
    for (column, condition) in object {
        let descriptor = dataset.column(column).ok_or_else(|| {
            let nearest = nearest_matches(column, dataset.column_names().into_iter(), 3);
            ApiError::unknown_column(column, nearest)
        })?;

        match condition {
            Value::Object(range) => {
                for op in parse_range(column, descriptor.kind, range)? {
                    filters.push(Filter { column: column.clone(), op });
                }
            },
            Value::Array(items) => {
                if items.len() > MAX_LIST_ITEMS {
                    return Err(ApiError::invalid_argument(format!(
                        "where.{} has {} items, maximum is {}",
                        column,
                        items.len(),
                        MAX_LIST_ITEMS
                    )));
                }
                let mut values = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    values.push(coerce_scalar(column, descriptor.kind, item).map_err(|e| {
                        ApiError::invalid_argument(format!("where.{}[{}]: {}", column, index, e.detail))
                    })?);
                }
                filters.push(Filter { column: column.clone(), op: FilterOp::In(values) });
            },
            scalar => {
                let op = FilterOp::Eq(coerce_scalar(column, descriptor.kind, scalar)?);
                filters.push(Filter { column: column.clone(), op });
            },
        }
    }
    Ok(filters)
}

/// A range object may carry several bounds ({gte, lte} is the common form);
/// each key becomes one filter.
fn parse_range(
    column: &str,
    kind: ColumnKind,
    range: &serde_json::Map<String, Value>,
) -> ApiResult<Vec<FilterOp>> {
    if range.is_empty() {
        return Err(ApiError::invalid_argument(format!(
            "where.{} range object is empty; accepted keys: {:?}",
            column, RANGE_KEYS
        )));
    }

    let mut ops = Vec::with_capacity(range.len());
    for (key, value) in range {
        let op = match key.as_str() {
            "gte" => FilterOp::Gte(coerce_scalar(column, kind, value)?),
            "lte" => FilterOp::Lte(coerce_scalar(column, kind, value)?),
            "gt" => FilterOp::Gt(coerce_scalar(column, kind, value)?),
            "lt" => FilterOp::Lt(coerce_scalar(column, kind, value)?),
            "in" => {
                let items = value.as_array().ok_or_else(|| {
                    ApiError::invalid_argument(format!(
                        "where.{}.in must be a list, got {}",
                        column,
                        type_name(value)
                    ))
                })?;
                if items.len() > MAX_LIST_ITEMS {
                    return Err(ApiError::invalid_argument(format!(
                        "where.{}.in has {} items, maximum is {}",
                        column,
                        items.len(),
                        MAX_LIST_ITEMS
                    )));
                }
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(coerce_scalar(column, kind, item)?);
                }
                FilterOp::In(values)
            },
            "contains" => {
                let needle = value.as_str().ok_or_else(|| {
                    ApiError::invalid_argument(format!(
                        "where.{}.contains must be a string, got {}",
                        column,
                        type_name(value)
                    ))
                })?;
                FilterOp::Contains(sanitise_string(column, needle)?)
            },
            other => {
                return Err(ApiError::invalid_argument(format!(
                    "where.{} range object accepts keys {:?}, got '{}'",
                    column, RANGE_KEYS, other
                )));
            },
        };
        ops.push(op);
    }
    Ok(ops)
}

const RANGE_KEYS: [&str; 6] = ["gte", "lte", "gt", "lt", "in", "contains"];

/// Coerce one scalar filter value against the column's declared type.
pub fn coerce_scalar(column: &str, kind: ColumnKind, value: &Value) -> ApiResult<SqlParam> {
    match value {
        Value::String(s) => {
            if kind.is_numeric() {
                return Err(ApiError::invalid_argument(format!(
                    "where.{} expects a number ({}), got string '{}'",
                    column,
                    kind.as_str(),
                    truncate_for_message(s)
                )));
            }
            Ok(SqlParam::Text(sanitise_string(column, s)?))
        },
        Value::Number(n) => {
            if !kind.is_numeric() {
                return Err(ApiError::invalid_argument(format!(
                    "where.{} expects a string ({}), got number {}",
                    column,
                    kind.as_str(),
                    n
                )));
            }
            match kind {
                ColumnKind::IntegerYear | ColumnKind::IntegerMonth | ColumnKind::Flag => n
                    .as_i64()
                    .map(SqlParam::Int)
                    .ok_or_else(|| {
                        ApiError::invalid_argument(format!(
                            "where.{} expects an integer, got {}",
                            column, n
                        ))
                    }),
                _ => n
                    .as_f64()
                    .map(SqlParam::Float)
                    .ok_or_else(|| {
                        ApiError::invalid_argument(format!(
                            "where.{} expects a number, got {}",
                            column, n
                        ))
                    }),
            }
        },
        Value::Bool(b) => {
            if kind == ColumnKind::Flag {
                Ok(SqlParam::Int(i64::from(*b)))
            } else {
                Err(ApiError::invalid_argument(format!(
                    "where.{} does not accept booleans",
                    column
                )))
            }
        },
        other => Err(ApiError::invalid_argument(format!(
            "where.{} must be a scalar, list or range object, got {}",
            column,
            type_name(other)
        ))),
    }
}

/// Bound the length and strip the characters the engine never forwards.
/// The stripped value is still bound as a parameter, so this is defence in
/// depth, not the injection barrier itself.
pub fn sanitise_string(column: &str, raw: &str) -> ApiResult<String> {
    if raw.len() > MAX_STRING_LEN {
        return Err(ApiError::invalid_argument(format!(
            "where.{} string value is {} bytes, maximum is {}",
            column,
            raw.len(),
            MAX_STRING_LEN
        )));
    }
    Ok(raw
        .chars()
        .filter(|c| !matches!(c, ';' | '\'' | '"' | '\\'))
        .collect())
}

fn parse_aggregations(
    dataset: &DatasetDescriptor,
    value: &Value,
) -> ApiResult<Vec<(String, AggFn, String)>> {
    let object = value.as_object().ok_or_else(|| {
        ApiError::invalid_argument(format!(
            "aggregations must be an object mapping columns to SUM|AVG|MIN|MAX|COUNT, got {}",
            type_name(value)
        ))
    })?;

    let mut aggregations = Vec::with_capacity(object.len());
    for (column, func) in object {
        let descriptor = dataset.column(column).ok_or_else(|| {
            let nearest = nearest_matches(column, dataset.column_names().into_iter(), 3);
            ApiError::unknown_column(column, nearest)
        })?;
        let func_name = func.as_str().ok_or_else(|| {
            ApiError::invalid_argument(format!(
                "aggregations.{} must be a string function name, got {}",
                column,
                type_name(func)
            ))
        })?;
        let agg = AggFn::parse(func_name)?;
        if agg.requires_numeric() && !descriptor.kind.is_numeric() {
            return Err(ApiError::invalid_argument(format!(
                "aggregations.{}: {} requires a numeric column, '{}' is {}",
                column,
                agg.as_sql(),
                column,
                descriptor.kind.as_str()
            )));
        }
        let alias = format!("{}_{}", agg.as_sql().to_lowercase(), column);
        aggregations.push((column.clone(), agg, alias));
    }
    Ok(aggregations)
}

fn parse_order_by(
    dataset: &DatasetDescriptor,
    value: &Value,
    agg_aliases: &[&str],
) -> ApiResult<Vec<OrderBy>> {
    let items = value.as_array().ok_or_else(|| {
        ApiError::invalid_argument(format!(
            "order_by must be a list of 'column' or 'column desc' strings, got {}",
            type_name(value)
        ))
    })?;

    let mut order_by = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let spec = item.as_str().ok_or_else(|| {
            ApiError::invalid_argument(format!(
                "order_by[{}] must be a string, got {}",
                index,
                type_name(item)
            ))
        })?;
        let mut parts = spec.split_whitespace();
        let column = parts.next().unwrap_or_default().to_string();
        let dir = match parts.next() {
            Some(dir) => OrderDir::parse(dir)?,
            None => OrderDir::Asc,
        };
        if parts.next().is_some() {
            return Err(ApiError::invalid_argument(format!(
                "order_by[{}] must be 'column' or 'column asc|desc', got '{}'",
                index, spec
            )));
        }
        if !dataset.has_column(&column) && !agg_aliases.contains(&column.as_str()) {
            let candidates = dataset
                .column_names()
                .into_iter()
                .map(str::to_string)
                .chain(agg_aliases.iter().map(|a| a.to_string()));
            let nearest = nearest_matches(&column, candidates, 3);
            return Err(ApiError::unknown_column(&column, nearest));
        }
        order_by.push(OrderBy { column, dir });
    }
    Ok(order_by)
}

pub(super) fn parse_limit(value: &Option<Value>, warnings: &mut Vec<String>) -> ApiResult<i64> {
    let Some(value) = value else {
        return Ok(DEFAULT_LIMIT);
    };
    let limit = value.as_i64().ok_or_else(|| {
        ApiError::invalid_argument(format!("limit must be an integer, got {}", type_name(value)))
    })?;
    if limit < 0 {
        return Err(ApiError::invalid_argument("limit cannot be negative"));
    }
    if limit > MAX_LIMIT {
        warnings.push(format!("limit {} clamped to {}", limit, MAX_LIMIT));
        return Ok(MAX_LIMIT);
    }
    Ok(limit)
}

/// Out-of-coverage scalar year filters warn and suggest the nearest covered
/// year; the query still executes.
fn coverage_check(
    dataset: &DatasetDescriptor,
    filters: &[Filter],
    warnings: &mut Vec<String>,
    suggestions: &mut Vec<String>,
) {
    for filter in filters {
        let Some(descriptor) = dataset.column(&filter.column) else { continue };
        if descriptor.kind != ColumnKind::IntegerYear {
            continue;
        }
        if let FilterOp::Eq(SqlParam::Int(year)) = &filter.op {
            let year = *year as i32;
            if !dataset.covers_year(year) {
                let nearest = dataset.nearest_year(year);
                warnings.push(format!(
                    "year {} is outside coverage {}-{}",
                    year, dataset.start_year, dataset.end_year
                ));
                suggestions.push(format!("nearest available year: {}", nearest));
            }
        }
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate_for_message(s: &str) -> String {
    if s.len() > 40 { format!("{}...", &s[..40]) } else { s.to_string() }
}
