// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Page routes.
//!
//! Each page returns the view model it renders from. Which pages need a
//! session is decided by the route table, not here.

use crate::error::{AppError, Result};
use crate::routes::api::check_query;
use crate::models::{CurrentSession, Expense, ExpenseQuery, Profile, SessionUser};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of expenses shown on the dashboard.
const RECENT_EXPENSES: u32 = 5;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(dashboard))
        .route("/expenses", get(expenses))
        .route("/settings", get(settings))
        .route("/login", get(login))
        .route("/signup", get(signup))
        .route("/reset-password", get(reset_password))
}

/// Sum of amounts. Rows written outside this service are not bounded, so the
/// sum may not fit.
fn total_cents(expenses: &[Expense]) -> Result<i64> {
    expenses
        .iter()
        .try_fold(0i64, |sum, e| sum.checked_add(e.amount_cents))
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "expense total overflows over {} rows",
                expenses.len()
            ))
        })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardView {
    pub user: SessionUser,
    pub profile: Option<Profile>,
    pub recent_expenses: Vec<Expense>,
    /// Sum over `recent_expenses`
    pub recent_total_cents: i64,
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
) -> Result<Json<DashboardView>> {
    let token = current.access_token();
    let profile = state.records.get_profile(&token).await?;
    let recent_expenses = state
        .records
        .list_expenses(
            &token,
            &ExpenseQuery {
                limit: Some(RECENT_EXPENSES),
                ..Default::default()
            },
        )
        .await?;
    let recent_total_cents = total_cents(&recent_expenses)?;

    Ok(Json(DashboardView {
        user: current.user,
        profile,
        recent_expenses,
        recent_total_cents,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpensesView {
    pub expenses: Vec<Expense>,
    pub total_cents: i64,
}

async fn expenses(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<ExpensesView>> {
    check_query(&query)?;
    let expenses = state
        .records
        .list_expenses(&current.access_token(), &query)
        .await?;
    let total_cents = total_cents(&expenses)?;
    Ok(Json(ExpensesView {
        expenses,
        total_cents,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsView {
    pub user: SessionUser,
    pub profile: Profile,
}

async fn settings(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
) -> Result<Json<SettingsView>> {
    let profile = state
        .records
        .get_profile(&current.access_token())
        .await?
        .ok_or_else(|| AppError::NotFound("profile".to_string()))?;
    Ok(Json(SettingsView {
        user: current.user,
        profile,
    }))
}

/// View model for the signed-out forms.
#[derive(Debug, Serialize, Deserialize)]
pub struct FormView {
    pub page: String,
    /// Where the form posts
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FormParams {
    error: Option<String>,
}

fn form_view(page: &str, action: &str, params: FormParams) -> Json<FormView> {
    Json(FormView {
        page: page.to_string(),
        action: action.to_string(),
        error: params.error,
    })
}

async fn login(Query(params): Query<FormParams>) -> Json<FormView> {
    form_view("login", "/auth/login", params)
}

async fn signup(Query(params): Query<FormParams>) -> Json<FormView> {
    form_view("signup", "/auth/signup", params)
}

/// Reached from a recovery link, which has already signed the user in.
async fn reset_password(Query(params): Query<FormParams>) -> Json<FormView> {
    form_view("reset-password", "/auth/update-password", params)
}
