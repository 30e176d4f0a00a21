// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Expense Tracker API Server
//!
//! Cookie-session web service over a hosted auth and database project.
//! `BACKEND_MODE=memory` runs everything in-process for local development.

use expense_tracker::{
    backend::{MemoryBackend, RestBackend},
    config::{BackendMode, Config},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.backend_mode,
        unlisted_routes = ?config.routes.unlisted(),
        "Starting Expense Tracker API"
    );

    let state = match config.backend_mode {
        BackendMode::Rest => {
            let backend = Arc::new(RestBackend::from_config(&config)?);
            tracing::info!(url = %config.backend_url, "Using hosted backend");
            AppState::new(config.clone(), backend.clone(), backend)
        }
        BackendMode::Memory => {
            tracing::warn!("Using in-memory backend; all data is lost on exit");
            AppState::with_memory_backend(config.clone(), MemoryBackend::default())
        }
    };

    // Build router
    let app = expense_tracker::routes::create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("expense_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
