// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. The elevated service-role key is kept
//! in [`ServiceRoleKey`] so it never shows up in logs or `Debug` output.

use crate::session::routes::{RouteTable, UnlistedRoutes};
use std::env;
use std::fmt;
use std::time::Duration;

/// Default protected path patterns (home, feature pages, settings, JSON API).
pub const DEFAULT_PROTECTED_PATHS: &str = "/,/expenses/*,/settings/*,/api/*";

/// Default public path patterns (auth handlers, health, recovery form).
pub const DEFAULT_PUBLIC_PATHS: &str = "/auth/*,/health,/reset-password";

/// Upper bound on `SESSION_MAX_AGE_DAYS` (ten years).
const MAX_SESSION_DAYS: i64 = 3650;

/// Which backend implementation to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Hosted backend reached over HTTP.
    Rest,
    /// In-process backend for local development and tests.
    Memory,
}

/// Elevated backend key. Only the admin calls read it.
#[derive(Clone)]
pub struct ServiceRoleKey(String);

impl ServiceRoleKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServiceRoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceRoleKey(<redacted>)")
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Backend project ---
    /// Public endpoint of the backend project
    pub backend_url: String,
    /// Public anonymous key (safe to hand to browsers)
    pub anon_key: String,
    /// Elevated key, server side only
    pub service_role_key: ServiceRoleKey,
    /// Backend implementation
    pub backend_mode: BackendMode,

    // --- Server ---
    /// Public URL of this site (cookie `Secure` flag, CORS, email links)
    pub site_url: String,
    /// Server port
    pub port: u16,

    // --- Session gate ---
    /// Upper bound on each credential store call made by the gate
    pub auth_timeout: Duration,
    /// Lifetime of the session cookies
    pub session_max_age: time::Duration,
    /// Route protection table
    pub routes: RouteTable,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            anon_key: "test_anon_key".to_string(),
            service_role_key: ServiceRoleKey::new("test_service_role_key"),
            backend_mode: BackendMode::Memory,
            site_url: "http://localhost:3000".to_string(),
            port: 3000,
            auth_timeout: Duration::from_secs(5),
            session_max_age: time::Duration::days(30),
            routes: RouteTable::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development. In memory mode the
    /// three backend values are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend_mode = match env::var("BACKEND_MODE").as_deref() {
            Ok("memory") => BackendMode::Memory,
            Ok("rest") | Err(_) => BackendMode::Rest,
            Ok(other) => return Err(ConfigError::Invalid("BACKEND_MODE", other.to_string())),
        };

        let required = |name: &'static str, dev_default: &str| -> Result<String, ConfigError> {
            match env::var(name) {
                Ok(v) => Ok(v.trim().to_string()),
                Err(_) if backend_mode == BackendMode::Memory => Ok(dev_default.to_string()),
                Err(_) => Err(ConfigError::Missing(name)),
            }
        };

        let unlisted = match env::var("UNLISTED_ROUTES").as_deref() {
            Ok("protected") => UnlistedRoutes::Protected,
            Ok("public") | Err(_) => UnlistedRoutes::Public,
            Ok(other) => return Err(ConfigError::Invalid("UNLISTED_ROUTES", other.to_string())),
        };

        let protected =
            env::var("PROTECTED_PATHS").unwrap_or_else(|_| DEFAULT_PROTECTED_PATHS.to_string());
        let public = env::var("PUBLIC_PATHS").unwrap_or_else(|_| DEFAULT_PUBLIC_PATHS.to_string());
        let routes = RouteTable::default()
            .with_protected(split_list(&protected))
            .with_public(split_list(&public))
            .with_unlisted(unlisted);

        let session_days = session_max_age_days(env::var("SESSION_MAX_AGE_DAYS").ok().as_deref())?;

        Ok(Self {
            backend_url: required("BACKEND_URL", "http://localhost:54321")?,
            anon_key: required("BACKEND_ANON_KEY", "local-anon-key")?,
            service_role_key: ServiceRoleKey::new(required(
                "BACKEND_SERVICE_ROLE_KEY",
                "local-service-role-key",
            )?),
            backend_mode,
            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            auth_timeout: Duration::from_millis(
                env::var("AUTH_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5000),
            ),
            session_max_age: time::Duration::days(session_days),
            routes,
        })
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.site_url.starts_with("https://")
    }
}

/// Cookie lifetime in days: 30 when unset, otherwise 1 to ten years.
fn session_max_age_days(raw: Option<&str>) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(30);
    };
    match raw.trim().parse::<i64>() {
        Ok(days) if (1..=MAX_SESSION_DAYS).contains(&days) => Ok(days),
        _ => Err(ConfigError::Invalid("SESSION_MAX_AGE_DAYS", raw.to_string())),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
