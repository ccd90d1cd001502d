//! Maps lifecycle failures onto HTTP responses.

use crate::domain::error::LifecycleError;
use crate::domain::validation::FieldError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub struct ApiError(LifecycleError);

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(LifecycleError::Validation(vec![FieldError::new(
            "body",
            rejection.body_text(),
        )]))
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        Self(LifecycleError::field("id", "id must be a valid id"))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LifecycleError::Validation(_) | LifecycleError::IncompleteFeedback { .. } => {
                StatusCode::BAD_REQUEST
            }
            LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
            LifecycleError::AlreadySubmitted { .. }
            | LifecycleError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            LifecycleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.0 {
            LifecycleError::Validation(errors) => json!({ "errors": errors }),
            LifecycleError::Storage(err) => {
                tracing::error!("Storage failure: {}", err);
                json!({ "message": "internal server error" })
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
