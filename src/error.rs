// src/error.rs
//
// Error taxonomy for the API surface. Every failure a handler can produce
// maps onto one of these variants, which render as the standard
// `{ success: false, message }` JSON body with the matching status code.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::models::auth::ErrorResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// External platform failure during a sync run. Carries the number of
    /// conversations already synced so partial progress is reported rather
    /// than discarded.
    #[error("{message} ({conversations_synced} conversations synced before failure)")]
    Upstream {
        message: String,
        conversations_synced: usize,
    },

    #[error("Internal server error")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn upstream(message: impl Into<String>, conversations_synced: usize) -> Self {
        ApiError::Upstream {
            message: message.into(),
            conversations_synced,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Database(e) => tracing::error!("Database error: {}", e),
            ApiError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            ApiError::Upstream { message, .. } => tracing::warn!("Upstream error: {}", message),
            _ => {}
        }

        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinct_from_unauthorized() {
        assert_eq!(
            ApiError::NotFound("Chat not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Unauthorized("Invalid token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_upstream_error_reports_partial_progress() {
        let err = ApiError::upstream("Failed to fetch conversations", 3);
        assert!(err.to_string().contains("3 conversations synced"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_database_error_hides_details() {
        let err = ApiError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), "Internal server error");
    }
}
