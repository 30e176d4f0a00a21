// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::backend::{AuthError, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Already registered: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Backend error: {0}")]
    Remote(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidGrant => AppError::InvalidCredentials,
            AuthError::EmailNotConfirmed => AppError::EmailNotConfirmed,
            AuthError::UserExists => AppError::Conflict("email".to_string()),
            AuthError::Rejected(msg) => AppError::BadRequest(msg),
            AuthError::Remote(msg) => AppError::Remote(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthenticated => AppError::Unauthorized,
            StoreError::Rejected(msg) => AppError::BadRequest(msg),
            StoreError::Remote(msg) => AppError::Remote(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        match first_invalid_field(&errors) {
            Some((field, message)) => AppError::Validation { field, message },
            None => AppError::BadRequest("validation failed".to_string()),
        }
    }
}

/// The first offending field and its message, sorted by field name for
/// stable output.
pub(crate) fn first_invalid_field(errors: &validator::ValidationErrors) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let (field, errs) = fields.into_iter().next()?;
    let message = errs
        .first()
        .map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string())
        })
        .unwrap_or_else(|| "invalid".to_string());
    Some((field.to_string(), message))
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, field, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None, None),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None, None)
            }
            AppError::EmailNotConfirmed => {
                (StatusCode::FORBIDDEN, "email_not_confirmed", None, None)
            }
            AppError::Conflict(what) => (
                StatusCode::CONFLICT,
                "already_registered",
                Some(what.clone()),
                None,
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", None, Some(msg.clone())),
            AppError::Validation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                Some(field.clone()),
                Some(message.clone()),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", None, Some(msg.clone()))
            }
            AppError::Remote(msg) => {
                tracing::warn!(error = %msg, "Backend call failed");
                (StatusCode::BAD_GATEWAY, "remote_error", None, None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None, None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            field,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
