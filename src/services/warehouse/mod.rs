//! Warehouse Gateway
//!
//! Safe, bounded, read-only access to the embedded SQLite warehouse. Owns
//! the connection pool and the TTL result cache. Every query goes through
//! `execute`/`execute_cached` with bound parameters; string concatenation of
//! user values into SQL never happens here or anywhere above.

mod cache;

pub use cache::{CacheStats, ResultCache};

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, WarehouseConfig};
use crate::utils::{ApiError, ApiResult};

/// One result row as an ordered name -> value mapping.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A bindable query parameter. The query engine only ever produces these
/// three shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Pool counters exposed via `GET /health`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}

pub struct WarehouseGateway {
    pool: SqlitePool,
    cache: ResultCache,
    query_timeout: Duration,
    max_size: u32,
}

impl WarehouseGateway {
    /// Open the warehouse read-only and build the pool.
    ///
    /// Pool policy: `pool_size` connections are kept warm, up to
    /// `max_overflow` more may be opened under load, checkout blocks for at
    /// most `acquire_timeout_secs` and every checkout is probed
    /// (`test_before_acquire`) so broken connections are discarded instead
    /// of handed out.
    pub async fn open(warehouse: &WarehouseConfig, cache: &CacheConfig) -> ApiResult<Self> {
        if !Path::new(&warehouse.db_path).exists() {
            return Err(ApiError::internal_error(format!(
                "warehouse file not found: {}",
                warehouse.db_path
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&warehouse.db_path)
            .read_only(true)
            .create_if_missing(false);

        let max_size = warehouse.pool_size + warehouse.max_overflow;
        let pool = SqlitePoolOptions::new()
            .min_connections(warehouse.pool_size)
            .max_connections(max_size)
            .acquire_timeout(Duration::from_secs(warehouse.acquire_timeout_secs))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(ApiError::from)?;

        tracing::info!(
            db_path = %warehouse.db_path,
            pool_size = warehouse.pool_size,
            max_overflow = warehouse.max_overflow,
            "warehouse opened read-only"
        );

        Ok(Self {
            pool,
            cache: ResultCache::new(cache.size, Duration::from_secs(cache.ttl_seconds)),
            query_timeout: Duration::from_secs(warehouse.query_timeout_secs),
            max_size,
        })
    }

    /// Scoped connection checkout. Release is guaranteed on every exit path
    /// by the pool guard; a bounded wait maps to `PoolExhausted`.
    pub async fn acquire(&self) -> ApiResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool.acquire().await.map_err(ApiError::from)
    }

    /// Checkout probe used by the health endpoint. Pool checkouts themselves
    /// are probed by the pool.
    pub async fn probe(&self) -> ApiResult<()> {
        let result: Result<(i64,), sqlx::Error> =
            sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        match result {
            Ok((1,)) => Ok(()),
            Ok(_) => Err(ApiError::connection_unhealthy("probe returned unexpected value")),
            Err(e) => match ApiError::from(e) {
                e if e.kind == crate::utils::ErrorKind::PoolExhausted => Err(e),
                e => Err(ApiError::connection_unhealthy(e.detail)),
            },
        }
    }

    /// Execute a parameterised query and return shaped rows.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> ApiResult<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlParam::Text(s) => query.bind(s.clone()),
                SqlParam::Int(i) => query.bind(*i),
                SqlParam::Float(f) => query.bind(*f),
            };
        }

        let started = std::time::Instant::now();
        let mut conn = self.acquire().await?;
        let rows = tokio::time::timeout(self.query_timeout, query.fetch_all(&mut *conn))
            .await
            .map_err(|_| {
                ApiError::storage_transient(format!(
                    "query exceeded {}s timeout",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(ApiError::from)?;

        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warehouse query executed"
        );

        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Same contract as `execute`, memoised under
    /// hash(sql, canonical-JSON(params)) with the configured TTL and size
    /// bound.
    pub async fn execute_cached(&self, sql: &str, params: &[SqlParam]) -> ApiResult<Vec<Row>> {
        let key = cache_key(sql, params);

        if let Some(rows) = self.cache.get(&key) {
            tracing::debug!(cache = "hit", "warehouse cache lookup");
            return Ok(rows.as_ref().clone());
        }
        tracing::debug!(cache = "miss", "warehouse cache lookup");

        let rows = self.execute(sql, params).await?;
        self.cache.insert(key, Arc::new(rows.clone()));
        Ok(rows)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!("warehouse result cache cleared");
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus { size: self.pool.size(), idle: self.pool.num_idle(), max_size: self.max_size }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Stable cache key: the SQL text plus the canonical JSON encoding of the
/// parameter list, collapsed through a hasher.
fn cache_key(sql: &str, params: &[SqlParam]) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sql.hash(&mut hasher);
    canonical.hash(&mut hasher);
    format!("{:016x}:{}", hasher.finish(), sql.len())
}

/// Shape a SQLite row into a JSON object using the declared column types.
fn row_to_json(row: &SqliteRow) -> Row {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INTEGER" | "BOOLEAN" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
            "REAL" | "NUMERIC" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(|f| {
                    serde_json::Number::from_f64(f)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                })
                .unwrap_or(serde_json::Value::Null),
            "TEXT" | "DATE" | "DATETIME" => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
            // NULL-typed result columns (e.g. aggregates over zero rows) and
            // blobs fall through here.
            _ => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_param_sensitive() {
        let a = cache_key("SELECT 1", &[SqlParam::Int(1)]);
        let b = cache_key("SELECT 1", &[SqlParam::Int(1)]);
        let c = cache_key("SELECT 1", &[SqlParam::Int(2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn cache_key_distinguishes_param_types() {
        // "1" as text and 1 as int must not collide.
        let text = cache_key("SELECT ?", &[SqlParam::Text("1".into())]);
        let int = cache_key("SELECT ?", &[SqlParam::Int(1)]);
        assert_ne!(text, int);
    }
}
