// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session gate middleware.
//!
//! Runs once per request before any handler: refreshes the cookie session,
//! classifies the path and either redirects or lets the request through. The
//! resulting cookie jar is attached to every response, whichever branch ran;
//! dropping it would send the browser back with stale credentials.

use crate::error::AppError;
use crate::models::CurrentSession;
use crate::session::{decide, refresh_session, Decision};
use crate::AppState;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use std::sync::Arc;

/// Middleware that refreshes the session and enforces route protection.
///
/// On continue with a live session, a [`CurrentSession`] is inserted into the
/// request extensions for handlers.
///
/// [`CurrentSession`]: crate::models::CurrentSession
pub async fn session_gate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let (current, jar) = refresh_session(
        state.auth.as_ref(),
        jar,
        &state.cookies,
        state.config.auth_timeout,
    )
    .await;

    let path = request.uri().path().to_string();
    let class = state.config.routes.classify(&path);

    match decide(class, current.is_some()) {
        Decision::RedirectTo(location) => {
            tracing::debug!(path = %path, location, "Gate redirect");
            (jar, Redirect::temporary(location)).into_response()
        }
        Decision::Continue => {
            if let Some(current) = current {
                request.extensions_mut().insert(current);
            }
            let response = next.run(request).await;
            attach_jar(jar, response)
        }
    }
}

/// Handlers that need a signed-in user take `CurrentSession` directly; a
/// missing session is a 401 rather than a redirect, since the gate has
/// already made its routing decision.
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentSession>().cloned())
    }
}

/// Attach the gate's cookies ahead of any the handler set, so a handler that
/// signs in or out has the final word.
fn attach_jar(jar: CookieJar, mut response: Response) -> Response {
    let handler_cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .cloned()
        .collect();
    response.headers_mut().remove(header::SET_COOKIE);

    let mut response = (jar, response).into_response();
    for value in handler_cookies {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
