// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client side of the session: an HTTP client that keeps the session cookies,
//! an auth event bus, and the per-tab session context built on both.

pub mod api;
pub mod context;
pub mod events;

pub use api::{ApiClient, LinkOutcome};
pub use context::{SessionContext, SessionSnapshot};
pub use events::{AuthEvent, AuthEvents, Subscription};

/// Errors surfaced to client code. Each maps to an inline message: next to a
/// field, or in a banner.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request failed: {0}")]
    Remote(String),
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = crate::error::first_invalid_field(&errors)
            .unwrap_or_else(|| ("form".to_string(), "invalid".to_string()));
        ClientError::Validation { field, message }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Remote(err.to_string())
    }
}
