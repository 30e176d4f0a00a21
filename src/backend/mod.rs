// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend layer: the external credential store and the row-level-secured
//! record store.
//!
//! Two implementations exist: [`rest::RestBackend`] talks to the hosted
//! project over HTTP, [`memory::MemoryBackend`] runs in-process for local
//! development and tests.

pub mod memory;
pub mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

use crate::models::{
    AccessToken, Expense, ExpenseQuery, ExpenseUpdate, NewExpense, Profile, ProfileUpdate,
    Session, SessionUser, UserId,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const EXPENSES: &str = "expenses";
}

/// Result of presenting an access token to the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(SessionUser),
    Expired,
    Invalid,
}

/// Kind of one-time code carried by an email link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpKind {
    /// Sign-up confirmation or magic link
    #[default]
    Email,
    Recovery,
}

/// Result of a sign-up call.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Account created and signed in.
    SignedIn(Session),
    /// Account created; the email address must be confirmed first.
    ConfirmationRequired,
}

/// Credential store errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Refresh token is invalid, expired or revoked")]
    InvalidGrant,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("User already registered")]
    UserExists,

    #[error("Credential store rejected the request: {0}")]
    Rejected(String),

    #[error("Credential store unreachable: {0}")]
    Remote(String),
}

/// Record store errors. Policy denials are not errors; they look like
/// missing rows.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Record store rejected the request: {0}")]
    Rejected(String),

    #[error("Record store unreachable: {0}")]
    Remote(String),
}

/// External credential store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check an access token.
    async fn validate(&self, access_token: &str) -> Result<Validation, AuthError>;

    /// Exchange a refresh token for a new pair. The old pair stops working.
    async fn rotate(&self, refresh_token: &str) -> Result<(Session, SessionUser), AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Revoke the session behind this access token.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    /// Send a recovery link that lands on `redirect_to` with a one-time code.
    async fn request_password_reset(&self, email: &str, redirect_to: &str)
        -> Result<(), AuthError>;

    async fn update_password(&self, access_token: &str, new_password: &str)
        -> Result<(), AuthError>;

    /// Exchange a one-time code from an email link for a session.
    async fn exchange_code(&self, code: &str, kind: OtpKind) -> Result<Session, AuthError>;

    /// Delete a user with the elevated key. Profile and records cascade.
    async fn delete_user(&self, user_id: UserId) -> Result<(), AuthError>;
}

/// Record store with row-level policies.
///
/// Every call takes the caller's access token; the store decides which rows
/// that identity can see.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_profile(&self, auth: &AccessToken) -> Result<Option<Profile>, StoreError>;

    async fn update_profile(
        &self,
        auth: &AccessToken,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError>;

    async fn list_expenses(
        &self,
        auth: &AccessToken,
        query: &ExpenseQuery,
    ) -> Result<Vec<Expense>, StoreError>;

    async fn get_expense(&self, auth: &AccessToken, id: Uuid)
        -> Result<Option<Expense>, StoreError>;

    async fn create_expense(
        &self,
        auth: &AccessToken,
        expense: &NewExpense,
    ) -> Result<Expense, StoreError>;

    async fn update_expense(
        &self,
        auth: &AccessToken,
        id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<Option<Expense>, StoreError>;

    /// Returns whether a visible row was deleted.
    async fn delete_expense(&self, auth: &AccessToken, id: Uuid) -> Result<bool, StoreError>;
}
