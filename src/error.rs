//! Crate-wide error taxonomy mapped onto the JSON response envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::validate::FieldErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Identifier did not resolve. Carries the entity name for the message.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Client input failed declared constraints. Field -> messages.
    #[error("validation failed")]
    Validation(FieldErrors),

    /// Business-rule rejection, e.g. deleting a category still in use.
    #[error("{0}")]
    Conflict(String),

    /// Missing or invalid access token.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Authenticated but the two-factor gate is not satisfied. `code` is a
    /// machine-readable marker for API callers.
    #[error("{message}")]
    Forbidden {
        message: String,
        code: &'static str,
    },

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("database not available")]
    Unavailable,

    /// Unexpected failure. Detail is logged, never sent to the client.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": format!("{} not found", entity) }),
            ),
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "success": false, "errors": errors }),
            ),
            ApiError::Conflict(message) => (
                StatusCode::CONFLICT,
                json!({ "success": false, "message": message }),
            ),
            ApiError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "message": message }),
            ),
            ApiError::Forbidden { message, code } => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "message": message, "error": code }),
            ),
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "message": "Something went wrong" }),
                )
            }
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "success": false, "message": "Database not available" }),
            ),
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "message": "Something went wrong" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError::NotFound("Project").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_maps_to_422() {
        let mut errors = FieldErrors::new();
        validate::push(&mut errors, "name", "The name field is required.");
        let response = ApiError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let response = ApiError::Conflict("Category is in use".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        let response = ApiError::Forbidden {
            message: "Two-Factor Authentication is required".to_string(),
            code: "2FA_REQUIRED",
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_hides_detail() {
        let response = ApiError::Internal("connection refused at 10.0.0.3".to_string());
        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
