use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::catalog::CatalogError;
use crate::rank::RankError;
use crate::rate_limit::RateLimitError;

/// Error type for HTTP handlers; renders as `{"error", "code"}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<RankError> for AppError {
    fn from(e: RankError) -> Self {
        match e {
            RankError::Database(e) => AppError::Database(e),
            RankError::Catalog(e) => AppError::Catalog(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
            AppError::Catalog(CatalogError::InvalidLocale(locale)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_LOCALE",
                format!("invalid locale: {locale:?}"),
            ),
            AppError::Catalog(e) => {
                tracing::error!("Catalog unavailable: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "CATALOG_UNAVAILABLE",
                    "Game data catalog unavailable".to_string(),
                )
            }
            AppError::RateLimited(e) => {
                let body = json!({ "error": e.to_string(), "code": "RATE_LIMITED" });
                let retry = e.retry_after.as_secs().max(1).to_string();
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry)],
                    Json(body),
                )
                    .into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
