// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod credentials;
pub mod expense;
pub mod profile;
pub mod session;

pub use credentials::{
    AuthResponse, AuthStatus, NewPasswordForm, PasswordResetForm, SessionInfo, SignInForm,
    SignUpForm,
};
pub use expense::{Expense, ExpenseQuery, ExpenseUpdate, NewExpense, MAX_AMOUNT_CENTS};
pub use profile::{Profile, ProfileUpdate, SubscriptionTier};
pub use session::{AccessToken, CurrentSession, Session, SessionUser, UserId};
