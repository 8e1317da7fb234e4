use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Top-level error type the HTTP binding layer maps to a response.
///
/// Mirrors the transient/config/external/fatal taxonomy of spec.md §7:
/// `Vpn` surfaces the external case (`ensureUp` failures), `Database` is the
/// fatal case (propagated rather than swallowed), and `BadRequest`/`Conflict`
/// are ordinary request errors from the minimal CRUD binding.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("vpn error: {0}")]
    Vpn(#[from] crate::services::vpn::VpnError),

    #[error("not found")]
    NotFound,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
            }
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database operation failed".into(),
                )
            }
            AppError::Migration(e) => {
                tracing::error!("migration error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "migration failed".into())
            }
            AppError::Vpn(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = Json(json!({ "error": message, "success": false }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
