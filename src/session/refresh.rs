// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session refresher.
//!
//! Validates the cookie session with the credential store and, when the
//! access token has expired, rotates the pair and writes it back to the jar.
//! Any failure collapses to "no session" with the cookies cleared.

use crate::backend::{CredentialStore, Validation};
use crate::models::CurrentSession;
use crate::session::codec::{self, CookieSettings};
use axum_extra::extract::cookie::CookieJar;
use std::time::Duration;
use tokio::time::timeout;

/// Refresh the session carried by `jar`.
///
/// Returns the live session (if any) and the jar to attach to the response.
/// A jar without session cookies comes back unchanged. A valid session comes
/// back unchanged too, so calling this twice in a row never rotates.
pub async fn refresh_session(
    store: &dyn CredentialStore,
    jar: CookieJar,
    settings: &CookieSettings,
    limit: Duration,
) -> (Option<CurrentSession>, CookieJar) {
    let Some(session) = codec::decode(&jar) else {
        return (None, jar);
    };

    let validation = match timeout(limit, store.validate(&session.access_token)).await {
        Ok(Ok(validation)) => validation,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Session validation failed, treating as signed out");
            return (None, codec::clear(jar, settings));
        }
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Session validation timed out");
            return (None, codec::clear(jar, settings));
        }
    };

    match validation {
        Validation::Valid(user) => (Some(CurrentSession { user, session }), jar),
        Validation::Invalid => {
            tracing::info!("Access token rejected, clearing session");
            (None, codec::clear(jar, settings))
        }
        Validation::Expired => match timeout(limit, store.rotate(&session.refresh_token)).await {
            Ok(Ok((session, user))) => {
                tracing::debug!(user_id = %user.id, "Session refreshed");
                let jar = codec::encode(jar, &session, settings);
                (Some(CurrentSession { user, session }), jar)
            }
            Ok(Err(e)) => {
                tracing::info!(error = %e, "Session refresh failed, clearing session");
                (None, codec::clear(jar, settings))
            }
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Session refresh timed out");
                (None, codec::clear(jar, settings))
            }
        },
    }
}
