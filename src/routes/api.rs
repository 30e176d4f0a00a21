// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for signed-in users.
//!
//! The gate has already refreshed the session; handlers pass the caller's
//! access token to the record store and let row-level policies do the
//! filtering. A row the caller cannot see is reported as not found.

use crate::error::{AppError, Result};
use crate::models::{
    CurrentSession, Expense, ExpenseQuery, ExpenseUpdate, NewExpense, Profile, ProfileUpdate,
};
use crate::session::codec;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).patch(update_me))
        .route("/api/expenses", get(list_expenses).post(create_expense))
        .route(
            "/api/expenses/{id}",
            get(get_expense).patch(update_expense).delete(delete_expense),
        )
        .route("/api/account", delete(delete_account))
}

// ─── Profile ─────────────────────────────────────────────────

async fn get_me(State(state): State<Arc<AppState>>, current: CurrentSession) -> Result<Json<Profile>> {
    let profile = state
        .records
        .get_profile(&current.access_token())
        .await?
        .ok_or_else(|| AppError::NotFound("profile".to_string()))?;
    Ok(Json(profile))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    update.validate()?;

    let profile = state
        .records
        .update_profile(&current.access_token(), &update)
        .await?
        .ok_or_else(|| AppError::NotFound("profile".to_string()))?;
    tracing::debug!(user_id = %current.user.id, "Profile updated");
    Ok(Json(profile))
}

// ─── Expenses ────────────────────────────────────────────────

async fn list_expenses(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<Vec<Expense>>> {
    check_query(&query)?;
    let expenses = state
        .records
        .list_expenses(&current.access_token(), &query)
        .await?;
    Ok(Json(expenses))
}

/// Reject date ranges that can never match.
pub(crate) fn check_query(query: &ExpenseQuery) -> Result<()> {
    match (query.from, query.to) {
        (Some(from), Some(to)) if from > to => {
            Err(AppError::validation("from", "must not be after to"))
        }
        _ => Ok(()),
    }
}

async fn create_expense(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Json(expense): Json<NewExpense>,
) -> Result<(StatusCode, Json<Expense>)> {
    expense.validate()?;

    let created = state
        .records
        .create_expense(&current.access_token(), &expense)
        .await?;
    tracing::debug!(user_id = %current.user.id, expense_id = %created.id, "Expense created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_expense(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Expense>> {
    state
        .records
        .get_expense(&current.access_token(), id)
        .await?
        .map(Json)
        .ok_or_else(|| expense_not_found(id))
}

async fn update_expense(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Path(id): Path<Uuid>,
    Json(update): Json<ExpenseUpdate>,
) -> Result<Json<Expense>> {
    update.validate()?;

    state
        .records
        .update_expense(&current.access_token(), id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| expense_not_found(id))
}

async fn delete_expense(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if state
        .records
        .delete_expense(&current.access_token(), id)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(expense_not_found(id))
    }
}

fn expense_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("expense {id}"))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Debug, Serialize)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
}

/// Delete the caller's account. The profile and expenses go with it.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<DeleteAccountResponse>)> {
    tracing::info!(user_id = %current.user.id, "User-initiated account deletion");

    state.auth.delete_user(current.user.id).await?;

    let jar = codec::clear(jar, &state.cookies);
    Ok((
        jar,
        Json(DeleteAccountResponse {
            success: true,
            message: "Account deleted. All data has been removed.".to_string(),
        }),
    ))
}
