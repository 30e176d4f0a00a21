// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Expense tracker: authenticated CRUD on top of a hosted backend project.
//!
//! This crate provides the HTTP service (cookie sessions with transparent
//! refresh, route protection, profiles and expenses) and a small client-side
//! session context for talking to it.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod session;

use backend::{CredentialStore, MemoryBackend, RecordStore};
use config::Config;
use session::CookieSettings;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: Arc<dyn CredentialStore>,
    pub records: Arc<dyn RecordStore>,
    pub cookies: CookieSettings,
}

impl AppState {
    pub fn new(
        config: Config,
        auth: Arc<dyn CredentialStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let cookies = CookieSettings::from_config(&config);
        Self {
            config,
            auth,
            records,
            cookies,
        }
    }

    /// State backed by a single in-process backend.
    pub fn with_memory_backend(config: Config, backend: MemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self::new(config, backend.clone(), backend)
    }
}
