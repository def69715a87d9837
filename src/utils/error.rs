//! API Error Types
//!
//! Central error type for handlers and services. Every failure carries a
//! stable kind tag, an actionable detail message and optional suggestions.
//! In production mode the detail is sanitised before it leaves the process.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use once_cell::sync::OnceCell;
use serde_json::json;

/// Process-wide production flag, set once at startup. Controls whether error
/// detail may contain SQL or internal context.
static PRODUCTION_MODE: OnceCell<bool> = OnceCell::new();

/// Stable error kind tags emitted in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub enum ErrorKind {
    InvalidArgument,
    UnknownDataset,
    UnknownColumn,
    EntityUnresolved,
    GrainMismatch,
    NoDataFound,
    StorageTransient,
    StoragePermanent,
    PoolExhausted,
    ConnectionUnhealthy,
    RateLimited,
    LLMUnavailable,
    BudgetExhausted,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::UnknownDataset => "UnknownDataset",
            Self::UnknownColumn => "UnknownColumn",
            Self::EntityUnresolved => "EntityUnresolved",
            Self::GrainMismatch => "GrainMismatch",
            Self::NoDataFound => "NoDataFound",
            Self::StorageTransient => "StorageTransient",
            Self::StoragePermanent => "StoragePermanent",
            Self::PoolExhausted => "PoolExhausted",
            Self::ConnectionUnhealthy => "ConnectionUnhealthy",
            Self::RateLimited => "RateLimited",
            Self::LLMUnavailable => "LLMUnavailable",
            Self::BudgetExhausted => "BudgetExhausted",
            Self::Internal => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument | Self::UnknownColumn | Self::GrainMismatch => {
                StatusCode::BAD_REQUEST
            },
            Self::UnknownDataset | Self::NoDataFound => StatusCode::NOT_FOUND,
            Self::EntityUnresolved => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::PoolExhausted | Self::ConnectionUnhealthy | Self::StorageTransient => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            Self::LLMUnavailable => StatusCode::BAD_GATEWAY,
            Self::BudgetExhausted => StatusCode::GATEWAY_TIMEOUT,
            Self::StoragePermanent | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Kinds whose detail may leak internals and must be sanitised in
    /// production.
    fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Self::StorageTransient | Self::StoragePermanent | Self::Internal
        )
    }
}

/// Structured API error: `{error: <kind>, detail, suggestions?, request_id}`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}", .kind.as_str(), .detail)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: String,
    pub suggestions: Vec<String>,
    /// Seconds to wait, only for RateLimited.
    pub retry_after: Option<u64>,
    pub request_id: Option<String>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into(), suggestions: Vec::new(), retry_after: None, request_id: None }
    }

    /// Set the process-wide production flag. Call once at startup.
    pub fn set_production_mode(production: bool) {
        let _ = PRODUCTION_MODE.set(production);
    }

    fn production() -> bool {
        *PRODUCTION_MODE.get().unwrap_or(&false)
    }

    // Constructors, one per kind the codebase raises.

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, detail)
    }

    pub fn unknown_dataset(file_id: &str, nearest: Vec<String>) -> Self {
        Self::new(ErrorKind::UnknownDataset, format!("unknown dataset '{}'", file_id))
            .with_suggestions(nearest)
    }

    pub fn unknown_column(column: &str, nearest: Vec<String>) -> Self {
        Self::new(ErrorKind::UnknownColumn, format!("unknown column '{}'", column))
            .with_suggestions(nearest)
    }

    pub fn entity_unresolved(raw: &str, suggestions: Vec<String>) -> Self {
        Self::new(ErrorKind::EntityUnresolved, format!("could not resolve place name '{}'", raw))
            .with_suggestions(suggestions)
    }

    pub fn grain_mismatch(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::GrainMismatch, detail)
    }

    pub fn no_data_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoDataFound, detail)
    }

    pub fn storage_transient(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageTransient, detail)
    }

    pub fn storage_permanent(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoragePermanent, detail)
    }

    pub fn pool_exhausted(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::PoolExhausted, detail)
    }

    pub fn connection_unhealthy(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionUnhealthy, detail)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut e = Self::new(
            ErrorKind::RateLimited,
            format!("too many requests; retry after {}s", retry_after_secs),
        );
        e.retry_after = Some(retry_after_secs);
        e
    }

    pub fn llm_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::LLMUnavailable, detail)
    }

    pub fn budget_exhausted(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExhausted, detail)
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Detail as it may be shown to the caller.
    pub fn public_detail(&self) -> String {
        if Self::production() && self.kind.is_sensitive() {
            match self.kind {
                ErrorKind::Internal => "internal error".to_string(),
                _ => "storage error".to_string(),
            }
        } else {
            self.detail.clone()
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => {
                Self::pool_exhausted("warehouse connection pool exhausted")
            },
            sqlx::Error::PoolClosed => Self::pool_exhausted("warehouse connection pool closed"),
            sqlx::Error::RowNotFound => Self::no_data_found("no matching rows"),
            sqlx::Error::Database(db) => {
                let msg = db.message().to_lowercase();
                // Syntax and schema faults are permanent; everything else is
                // assumed transient (lock contention, I/O).
                if msg.contains("syntax")
                    || msg.contains("no such table")
                    || msg.contains("no such column")
                {
                    Self::storage_permanent(format!("warehouse rejected query: {}", db.message()))
                } else {
                    Self::storage_transient(format!("warehouse error: {}", db.message()))
                }
            },
            sqlx::Error::Io(e) => Self::storage_transient(format!("warehouse I/O error: {}", e)),
            other => Self::storage_transient(format!("warehouse error: {}", other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();

        if status.is_server_error() {
            tracing::error!(kind = self.kind.as_str(), detail = %self.detail, "request failed");
        } else {
            tracing::debug!(kind = self.kind.as_str(), detail = %self.detail, "request rejected");
        }

        let mut body = json!({
            "error": self.kind.as_str(),
            "detail": self.public_detail(),
        });
        if !self.suggestions.is_empty() {
            body["suggestions"] = json!(self.suggestions);
        }
        if let Some(id) = &self.request_id {
            body["request_id"] = json!(id);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after
            && let Ok(value) = secs.to_string().parse()
        {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_classification() {
        let e = ApiError::storage_permanent("near \"SELEC\": syntax error");
        assert_eq!(e.kind, ErrorKind::StoragePermanent);

        let e = ApiError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(e.kind, ErrorKind::PoolExhausted);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let e = ApiError::rate_limited(42);
        assert_eq!(e.retry_after, Some(42));
        assert_eq!(e.kind.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn suggestions_are_attached() {
        let e = ApiError::unknown_column("emisions_tonnes", vec!["emissions_tonnes".into()]);
        assert_eq!(e.suggestions, vec!["emissions_tonnes".to_string()]);
    }
}
