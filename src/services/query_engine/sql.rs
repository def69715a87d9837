//! Parameterised SQL Generation
//!
//! Every identifier that reaches this module has already been checked
//! against the catalog's declared columns, and every value is emitted as a
//! bind parameter. There is deliberately no API here that accepts a raw
//! string fragment.

use super::validate::{Filter, FilterOp, ValidatedQuery};
use crate::services::warehouse::SqlParam;

/// Render a validated query as `(sql, params)`.
pub fn build_select(query: &ValidatedQuery) -> (String, Vec<SqlParam>) {
    let mut params = Vec::new();

    let projection = if query.aggregations.is_empty() {
        query.select.join(", ")
    } else {
        let mut parts: Vec<String> = query.group_by.clone();
        for (column, func, alias) in &query.aggregations {
            parts.push(format!("{}({}) AS {}", func.as_sql(), column, alias));
        }
        parts.join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", projection, query.table);

    let (where_sql, where_params) = where_clause(&query.filters);
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
        params.extend(where_params);
    }

    if !query.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&query.group_by.join(", "));
    }

    if !query.order_by.is_empty() {
        let order: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", o.column, o.dir.as_sql()))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    sql.push_str(" LIMIT ?");
    params.push(SqlParam::Int(query.limit));

    (sql, params)
}

/// AND-joined filter clause with bind placeholders.
pub fn where_clause(filters: &[Filter]) -> (String, Vec<SqlParam>) {
    let mut clauses = Vec::with_capacity(filters.len());
    let mut params = Vec::new();

    for filter in filters {
        match &filter.op {
            FilterOp::Eq(value) => {
                clauses.push(format!("{} = ?", filter.column));
                params.push(value.clone());
            },
            FilterOp::In(values) => {
                if values.is_empty() {
                    // Empty membership matches nothing.
                    clauses.push("1 = 0".to_string());
                    continue;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} IN ({})", filter.column, placeholders));
                params.extend(values.iter().cloned());
            },
            FilterOp::Gte(value) => {
                clauses.push(format!("{} >= ?", filter.column));
                params.push(value.clone());
            },
            FilterOp::Lte(value) => {
                clauses.push(format!("{} <= ?", filter.column));
                params.push(value.clone());
            },
            FilterOp::Gt(value) => {
                clauses.push(format!("{} > ?", filter.column));
                params.push(value.clone());
            },
            FilterOp::Lt(value) => {
                clauses.push(format!("{} < ?", filter.column));
                params.push(value.clone());
            },
            FilterOp::Contains(needle) => {
                clauses.push(format!("{} LIKE '%' || ? || '%'", filter.column));
                params.push(SqlParam::Text(needle.clone()));
            },
        }
    }

    (clauses.join(" AND "), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::query_engine::validate::{AggFn, OrderBy, OrderDir};

    fn base_query() -> ValidatedQuery {
        ValidatedQuery {
            table: "transport_country_year".to_string(),
            select: vec!["country_name".into(), "year".into(), "emissions_tonnes".into()],
            filters: vec![],
            group_by: vec![],
            order_by: vec![],
            aggregations: vec![],
            limit: 20,
            warnings: vec![],
            suggestions: vec![],
        }
    }

    #[test]
    fn plain_select_binds_only_limit() {
        let (sql, params) = build_select(&base_query());
        assert_eq!(
            sql,
            "SELECT country_name, year, emissions_tonnes FROM transport_country_year LIMIT ?"
        );
        assert_eq!(params, vec![SqlParam::Int(20)]);
    }

    #[test]
    fn filters_become_placeholders() {
        let mut q = base_query();
        q.filters = vec![
            Filter { column: "country_name".into(), op: FilterOp::Eq(SqlParam::Text("Germany".into())) },
            Filter { column: "year".into(), op: FilterOp::Gte(SqlParam::Int(2020)) },
        ];
        let (sql, params) = build_select(&q);
        assert!(sql.contains("WHERE country_name = ? AND year >= ?"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn aggregation_projects_group_keys_and_aliases() {
        let mut q = base_query();
        q.group_by = vec!["country_name".into()];
        q.aggregations =
            vec![("emissions_tonnes".into(), AggFn::Sum, "sum_emissions_tonnes".into())];
        q.order_by = vec![OrderBy { column: "sum_emissions_tonnes".into(), dir: OrderDir::Desc }];
        let (sql, _) = build_select(&q);
        assert!(sql.starts_with(
            "SELECT country_name, SUM(emissions_tonnes) AS sum_emissions_tonnes FROM"
        ));
        assert!(sql.contains("GROUP BY country_name"));
        assert!(sql.contains("ORDER BY sum_emissions_tonnes DESC"));
    }

    #[test]
    fn empty_membership_matches_nothing() {
        let mut q = base_query();
        q.filters = vec![Filter { column: "year".into(), op: FilterOp::In(vec![]) }];
        let (sql, params) = build_select(&q);
        assert!(sql.contains("1 = 0"));
        assert_eq!(params, vec![SqlParam::Int(20)]);
    }
}
