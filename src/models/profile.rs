// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile model (`profiles` table).

use crate::models::session::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Subscription tier. Changed by billing, never by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
}

/// One row per user, created by the backend when the user is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same as the user id
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Free-form user preferences
    #[serde(default = "empty_object")]
    pub preferences: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Profile {
    /// Row the backend creates for a new user.
    pub fn new_for_user(id: UserId, email: &str, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: email.to_string(),
            display_name,
            subscription_tier: SubscriptionTier::Free,
            onboarding_completed: false,
            preferences: empty_object(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an owner update in place.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(done) = update.onboarding_completed {
            self.onboarding_completed = done;
        }
        if let Some(prefs) = &update.preferences {
            self.preferences = prefs.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 80))]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_preferences"))]
    pub preferences: Option<serde_json::Value>,
}

fn validate_preferences(value: &serde_json::Value) -> Result<(), validator::ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(validator::ValidationError::new("preferences_not_object"))
    }
}
