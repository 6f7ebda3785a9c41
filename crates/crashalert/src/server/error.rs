//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or rejected input (400).
    #[error("{message}")]
    BadRequest {
        /// What was wrong.
        message: String,
    },

    /// Unknown resource (404).
    #[error("{resource} not found")]
    NotFound {
        /// Resource kind, e.g. "Contact".
        resource: String,
        /// Requested id.
        id: String,
    },

    /// Request conflicts with the resource's current state (409).
    #[error("{message}")]
    Conflict {
        /// Why the request cannot be applied.
        message: String,
    },

    /// Anything else (500).
    #[error("{message}")]
    Internal {
        /// Description for the log and the caller.
        message: String,
        /// Underlying domain error.
        #[source]
        source: Option<crate::Error>,
    },
}

impl ApiError {
    /// 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// 404 for `resource` with `id`.
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// 500 with `message`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Validation { message } => Self::BadRequest { message },
            crate::Error::NotFound { resource, id } => Self::not_found(resource, id),
            crate::Error::InvalidTransition { .. } => Self::Conflict {
                message: err.to_string(),
            },
            other => Self::Internal {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::Internal { source: Some(src), .. } => {
                tracing::error!(error = %self, source = %src, "API error");
            }
            Self::Internal { .. } => tracing::error!(error = %self, "API error"),
            _ => tracing::warn!(error = %self, "API error"),
        }

        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("Contact", 3).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_domain_error() {
        let api: ApiError = crate::Error::validation("name too short").into();
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(api.to_string(), "name too short");

        let api: ApiError = crate::Error::not_found("contact", 9).into();
        assert_eq!(api.status_code(), StatusCode::NOT_FOUND);

        let api: ApiError = crate::Error::InvalidTransition {
            state: "fired".to_string(),
            event: "cancel".to_string(),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::CONFLICT);
        assert_eq!(api.error_code(), "CONFLICT");

        let api: ApiError = crate::Error::internal("disk on fire").into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_response_body_shape() {
        let response = ApiError::bad_request("Invalid contact ID").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "BAD_REQUEST");
        assert_eq!(body.message, "Invalid contact ID");
    }
}
