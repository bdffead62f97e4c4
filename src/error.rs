//! Centralized error shaping for HTTP handlers.
//!
//! Every handler returns `Result<_, ApiError>` so failures leave the router as
//! a JSON `{"error", "message"}` body with a matching status. Database
//! details are logged here and never reach the client.

use axum::Json;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::services::account::AccountError;
use crate::services::auth::AuthError;
use crate::services::deployment::DeploymentError;
use crate::services::models::ModelError;
use crate::services::training::TrainingError;

/// JSON error body shared by every rejection the server produces.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self { error: error.into(), message: message.into() }
    }
}

/// Build a JSON error response without going through `ApiError`.
pub fn json_error(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(error, message))).into_response()
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "Bad request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "Not found",
            Self::Conflict(_) => "Conflict",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::Database(_) | Self::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                "an unexpected error occurred".to_owned()
            }
            Self::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                "an unexpected error occurred".to_owned()
            }
            other => other.to_string(),
        };
        json_error(self.status(), self.category(), message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge { limit: crate::middleware::BODY_LIMIT_BYTES };
        }
        Self::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge { limit: crate::middleware::BODY_LIMIT_BYTES };
        }
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        if rejection.status().is_server_error() {
            return Self::Internal(rejection.body_text());
        }
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

// =============================================================================
// SERVICE ERRORS
// =============================================================================

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Db(e) => Self::Database(e),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidEmail | AccountError::InvalidName | AccountError::WeakPassword => {
                Self::BadRequest(err.to_string())
            }
            AccountError::EmailTaken => Self::Conflict(err.to_string()),
            AccountError::InvalidCredentials => Self::Unauthorized,
            AccountError::Deactivated => Self::Forbidden(err.to_string()),
            AccountError::Hash(detail) => Self::Internal(detail),
            AccountError::Db(e) => Self::Database(e),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Invalid(msg) => Self::BadRequest(msg),
            ModelError::NotFound => Self::NotFound(err.to_string()),
            ModelError::Db(e) => Self::Database(e),
        }
    }
}

impl From<TrainingError> for ApiError {
    fn from(err: TrainingError) -> Self {
        match err {
            TrainingError::Invalid(msg) => Self::BadRequest(msg),
            TrainingError::NotFound | TrainingError::ModelNotFound => Self::NotFound(err.to_string()),
            TrainingError::NotCancellable(_) => Self::Conflict(err.to_string()),
            TrainingError::Db(e) => Self::Database(e),
        }
    }
}

impl From<DeploymentError> for ApiError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::InvalidReplicas => Self::BadRequest(err.to_string()),
            DeploymentError::ModelNotFound | DeploymentError::NotFound => Self::NotFound(err.to_string()),
            DeploymentError::Db(e) => Self::Database(e),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
