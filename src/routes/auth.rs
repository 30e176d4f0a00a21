// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-up, sign-in, sign-out and email-link routes.
//!
//! Every form is validated before the credential store is called. Tokens only
//! ever travel in cookies; JSON bodies carry status and identity.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::backend::{OtpKind, SignUpOutcome};
use crate::error::{AppError, Result};
use crate::models::{
    AuthResponse, AuthStatus, CurrentSession, NewPasswordForm, PasswordResetForm, SessionInfo,
    SignInForm, SignUpForm,
};
use crate::session::codec;
use crate::AppState;

/// Where the callback lands when `next` is missing or unsafe.
const DEFAULT_NEXT: &str = "/";

/// Where a failed email link lands.
const CALLBACK_FAILED: &str = "/login?error=auth_callback_failed";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/auth/callback", get(callback))
        .route("/auth/reset-password", post(request_password_reset))
        .route("/auth/update-password", post(update_password))
        .route("/auth/session", get(session_info))
}

/// Create an account. Signs in immediately unless the store wants the email
/// address confirmed first.
async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<SignUpForm>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    form.validate()?;

    let outcome = state
        .auth
        .sign_up(&form.email, &form.password, form.display_name.as_deref())
        .await?;

    match outcome {
        SignUpOutcome::SignedIn(session) => {
            tracing::info!("Account created and signed in");
            let jar = codec::encode(jar, &session, &state.cookies);
            Ok((
                jar,
                Json(AuthResponse {
                    status: AuthStatus::SignedIn,
                }),
            ))
        }
        SignUpOutcome::ConfirmationRequired => {
            tracing::info!("Account created, awaiting email confirmation");
            Ok((
                jar,
                Json(AuthResponse {
                    status: AuthStatus::ConfirmationRequired,
                }),
            ))
        }
    }
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<SignInForm>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    form.validate()?;

    let session = state.auth.sign_in(&form.email, &form.password).await?;
    let jar = codec::encode(jar, &session, &state.cookies);

    Ok((
        jar,
        Json(AuthResponse {
            status: AuthStatus::SignedIn,
        }),
    ))
}

/// Revoke the session (best effort) and clear the cookies.
///
/// Always succeeds: a browser holding stale state must still be able to get
/// back to a clean signed-out page.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    current: Option<CurrentSession>,
    jar: CookieJar,
) -> Response {
    if let Some(current) = current {
        if let Err(e) = state.auth.sign_out(&current.session.access_token).await {
            tracing::warn!(user_id = %current.user.id, error = %e, "Sign-out revoke failed");
        } else {
            tracing::info!(user_id = %current.user.id, "Signed out");
        }
    }

    let jar = codec::clear(jar, &state.cookies);
    (jar, Redirect::to(crate::session::gate::LOGIN_PATH)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: OtpKind,
    next: Option<String>,
}

/// Landing point for email links: trade the one-time code for a session.
async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!("Auth callback without code");
        return Redirect::to(CALLBACK_FAILED).into_response();
    };

    match state.auth.exchange_code(&code, params.kind).await {
        Ok(session) => {
            let next = safe_next(params.next.as_deref());
            tracing::info!(kind = ?params.kind, next, "Auth callback exchanged code");
            let jar = codec::encode(jar, &session, &state.cookies);
            (jar, Redirect::to(next)).into_response()
        }
        Err(e) => {
            tracing::warn!(kind = ?params.kind, error = %e, "Auth callback code exchange failed");
            Redirect::to(CALLBACK_FAILED).into_response()
        }
    }
}

/// Only same-origin absolute paths are honored as a post-login destination.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path
        }
        _ => DEFAULT_NEXT,
    }
}

/// Send a recovery link. The response does not reveal whether the address
/// has an account.
async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(form): Json<PasswordResetForm>,
) -> Result<Json<AuthResponse>> {
    form.validate()?;

    let redirect_to = format!(
        "{}/auth/callback?type=recovery&next=/reset-password",
        state.config.site_url.trim_end_matches('/')
    );
    state
        .auth
        .request_password_reset(&form.email, &redirect_to)
        .await?;

    Ok(Json(AuthResponse {
        status: AuthStatus::EmailSent,
    }))
}

/// Set a new password for the signed-in user, typically after following a
/// recovery link.
async fn update_password(
    State(state): State<Arc<AppState>>,
    current: Option<CurrentSession>,
    Json(form): Json<NewPasswordForm>,
) -> Result<Json<AuthResponse>> {
    form.validate()?;
    let current = current.ok_or(AppError::Unauthorized)?;

    state
        .auth
        .update_password(&current.session.access_token, &form.password)
        .await?;
    tracing::info!(user_id = %current.user.id, "Password updated");

    Ok(Json(AuthResponse {
        status: AuthStatus::PasswordUpdated,
    }))
}

async fn session_info(current: Option<CurrentSession>) -> Json<SessionInfo> {
    Json(match current {
        Some(current) => SessionInfo {
            expires_at: Some(current.session.expires_at),
            user: Some(current.user),
        },
        None => SessionInfo::default(),
    })
}
