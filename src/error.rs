//! Application error taxonomy.
//!
//! Validation and not-found errors carry user-facing messages; database
//! errors are normalized before leaving the process so backend schema
//! details never reach a client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{0}")]
    Conflict(String),
    #[error("print service unavailable: {0}")]
    ExternalService(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// True when the underlying SQLite error is a UNIQUE constraint
    /// violation, the backstop for readable-id races.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db)) => db.message().contains("UNIQUE"),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ExternalService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Database(err) = &self {
            tracing::error!(?err, "database error");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
