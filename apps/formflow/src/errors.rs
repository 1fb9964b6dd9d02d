use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::forms::hierarchy::SelectError;
use crate::forms::models::FieldKey;
use crate::forms::session::SessionError;
use crate::forms::skills::SkillError;
use crate::forms::wizard::WizardError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid fields: {message}")]
    InvalidFields {
        message: String,
        fields: BTreeMap<FieldKey, String>,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Wizard(WizardError::StepInvalid { step, errors }) => {
                AppError::InvalidFields {
                    message: format!("Step {step} has invalid fields"),
                    fields: errors,
                }
            }
            SessionError::Wizard(e @ WizardError::NotEditing(_)) => AppError::Conflict(e.to_string()),
            SessionError::Skill(e @ SkillError::CatalogUnavailable) => AppError::Conflict(e.to_string()),
            SessionError::Select(e @ SelectError::LevelInactive(_)) => AppError::Conflict(e.to_string()),
            SessionError::CatalogRefresh(e) => AppError::Upstream(e.to_string()),
            SessionError::Submit(msg) => AppError::Rejected(msg),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidFields { message, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_FIELDS",
                message.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Rejected(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SUBMIT_REJECTED",
                msg.clone(),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "The recruitment API could not be reached".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let AppError::InvalidFields { fields, .. } = &self {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
