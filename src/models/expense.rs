// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Expense model (`expenses` table).

use crate::models::session::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Stored expense row. Owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    /// Owner (FK to profiles, cascade delete)
    pub user_id: UserId,
    /// Amount in minor currency units
    pub amount_cents: i64,
    pub category: String,
    pub description: Option<String>,
    pub spent_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn apply(&mut self, update: &ExpenseUpdate) {
        if let Some(amount) = update.amount_cents {
            self.amount_cents = amount;
        }
        if let Some(category) = &update.category {
            self.category = category.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(spent_on) = update.spent_on {
            self.spent_on = spent_on;
        }
        self.updated_at = Utc::now();
    }
}

/// Largest single amount accepted (one billion in major units).
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Client input for a new expense. The owner comes from the session.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewExpense {
    #[validate(range(min = 1, max = MAX_AMOUNT_CENTS))]
    pub amount_cents: i64,
    #[validate(length(min = 1, max = 40))]
    pub category: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub spent_on: NaiveDate,
}

/// Partial update of an expense.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ExpenseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = MAX_AMOUNT_CENTS))]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 40))]
    pub category: Option<String>,
    /// `Some(None)` clears the description; an absent field leaves it alone.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    #[validate(length(max = 500))]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent_on: Option<NaiveDate>,
}

/// Distinguish an explicit `null` from a missing field.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filters for listing expenses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Inclusive lower bound on `spent_on`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on `spent_on`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ExpenseQuery {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 500;

    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        self.category
            .as_deref()
            .map_or(true, |c| expense.category == c)
            && self.from.map_or(true, |d| expense.spent_on >= d)
            && self.to.map_or(true, |d| expense.spent_on <= d)
    }
}
