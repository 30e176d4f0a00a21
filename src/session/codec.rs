// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookies.
//!
//! The credential pair travels in three `HttpOnly` cookies. Values are passed
//! through untouched; the credential store owns their format.

use crate::config::Config;
use crate::models::Session;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::DateTime;

pub const ACCESS_COOKIE: &str = "et-access-token";
pub const REFRESH_COOKIE: &str = "et-refresh-token";
pub const EXPIRES_COOKIE: &str = "et-expires-at";

const SESSION_COOKIES: [&str; 3] = [ACCESS_COOKIE, REFRESH_COOKIE, EXPIRES_COOKIE];

/// Attributes applied to every session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Set `Secure` (the site is served over https)
    pub secure: bool,
    pub max_age: time::Duration,
}

impl CookieSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secure: config.secure_cookies(),
            max_age: config.session_max_age,
        }
    }
}

/// Read the session from a request's cookies.
///
/// Both tokens must be present. A missing or unreadable expiry decodes as the
/// Unix epoch; the credential store decides validity anyway.
pub fn decode(jar: &CookieJar) -> Option<Session> {
    let access_token = jar.get(ACCESS_COOKIE)?.value().to_string();
    let refresh_token = jar.get(REFRESH_COOKIE)?.value().to_string();
    if access_token.is_empty() || refresh_token.is_empty() {
        return None;
    }
    let expires_at = jar
        .get(EXPIRES_COOKIE)
        .and_then(|c| c.value().parse::<i64>().ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_default();

    Some(Session {
        access_token,
        refresh_token,
        expires_at,
    })
}

/// Write the session into the outgoing cookies.
pub fn encode(jar: CookieJar, session: &Session, settings: &CookieSettings) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        session.access_token.clone(),
        settings,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        session.refresh_token.clone(),
        settings,
    ))
    .add(session_cookie(
        EXPIRES_COOKIE,
        session.expires_at.timestamp().to_string(),
        settings,
    ))
}

/// Remove the session cookies.
pub fn clear(jar: CookieJar, settings: &CookieSettings) -> CookieJar {
    SESSION_COOKIES.iter().fold(jar, |jar, name| {
        jar.remove(
            Cookie::build(*name)
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(settings.secure),
        )
    })
}

fn session_cookie(name: &'static str, value: String, settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .max_age(settings.max_age)
        .build()
}
