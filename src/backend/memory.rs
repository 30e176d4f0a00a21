// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process backend for local development and tests.
//!
//! Behaves like the hosted project where it matters to this service:
//! - access tokens are signed JWTs with a short lifetime
//! - refresh tokens are single use; rotating retires the previous pair
//! - creating a user creates its profile row (trigger)
//! - deleting a user deletes its profile and records (cascade)
//! - record queries only see rows owned by the token's user (row-level policy)
//!
//! Outbound emails (confirmation, recovery) are captured in an outbox.

use super::{
    AuthError, CredentialStore, OtpKind, RecordStore, SignUpOutcome, StoreError, Validation,
};
use crate::models::{
    AccessToken, Expense, ExpenseQuery, ExpenseUpdate, NewExpense, Profile, ProfileUpdate,
    Session, SessionUser, UserId,
};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Lifetime and sign-up behaviour of the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub code_ttl: Duration,
    pub require_email_confirmation: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(30),
            code_ttl: Duration::hours(1),
            require_email_confirmation: false,
        }
    }
}

/// Why an email was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailPurpose {
    Confirmation,
    Recovery,
}

/// Captured outbound email.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub purpose: EmailPurpose,
    /// One-time code carried by the link
    pub code: String,
    pub link: String,
}

/// Access token claims.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    email: String,
    /// Session id
    sid: Uuid,
    jti: Uuid,
    exp: i64,
    iat: i64,
}

struct UserRecord {
    email: String,
    password_hash: String,
    confirmed: bool,
}

struct SessionRecord {
    user_id: UserId,
    access_jti: Uuid,
    refresh_hash: String,
    refresh_expires_at: DateTime<Utc>,
}

struct CodeRecord {
    user_id: UserId,
    purpose: EmailPurpose,
    expires_at: DateTime<Utc>,
}

struct Tables {
    users: HashMap<UserId, UserRecord>,
    users_by_email: HashMap<String, UserId>,
    sessions: HashMap<Uuid, SessionRecord>,
    /// sha256(refresh token) -> session id
    refresh_index: HashMap<String, Uuid>,
    codes: HashMap<String, CodeRecord>,
    outbox: Vec<OutboundEmail>,
    profiles: HashMap<UserId, Profile>,
    expenses: HashMap<Uuid, Expense>,
    clock_offset: Duration,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            users_by_email: HashMap::new(),
            sessions: HashMap::new(),
            refresh_index: HashMap::new(),
            codes: HashMap::new(),
            outbox: Vec::new(),
            profiles: HashMap::new(),
            expenses: HashMap::new(),
            clock_offset: Duration::zero(),
        }
    }
}

impl Tables {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    fn drop_session(&mut self, session_id: Uuid) {
        if let Some(record) = self.sessions.remove(&session_id) {
            self.refresh_index.remove(&record.refresh_hash);
        }
    }
}

/// In-memory credential and record store.
#[derive(Clone)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    signing_key: Arc<Vec<u8>>,
    settings: MemorySettings,
    rng: SystemRandom,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemorySettings::default())
    }
}

impl MemoryBackend {
    pub fn new(settings: MemorySettings) -> Self {
        let rng = SystemRandom::new();
        let mut key = vec![0u8; 32];
        if rng.fill(&mut key).is_err() {
            tracing::warn!("System RNG unavailable, deriving signing key from UUIDs");
            key = [Uuid::new_v4(), Uuid::new_v4()]
                .iter()
                .flat_map(|u| u.into_bytes())
                .collect();
        }
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            signing_key: Arc::new(key),
            settings,
            rng,
        }
    }

    /// Shift the backend's clock, e.g. to expire issued tokens in tests.
    pub async fn advance_clock(&self, by: Duration) {
        self.tables.lock().await.clock_offset += by;
    }

    /// Emails sent so far.
    pub async fn outbox(&self) -> Vec<OutboundEmail> {
        self.tables.lock().await.outbox.clone()
    }

    /// Number of live sessions for a user.
    pub async fn session_count(&self, user_id: UserId) -> usize {
        self.tables
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    fn random_token(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AuthError::Rejected("random generator failure".to_string()))?;
        Ok(hex::encode(bytes))
    }

    fn decode_claims(&self, token: &str) -> Option<Claims> {
        let mut validation = jsonwebtoken::Validation::new(Algorithm::HS256);
        // Expiry is checked against the backend clock instead
        validation.validate_exp = false;
        decode::<Claims>(token, &DecodingKey::from_secret(&self.signing_key), &validation)
            .ok()
            .map(|data| data.claims)
    }

    fn check_token(&self, tables: &Tables, token: &str) -> Validation {
        let Some(claims) = self.decode_claims(token) else {
            return Validation::Invalid;
        };
        let Some(record) = tables.sessions.get(&claims.sid) else {
            return Validation::Invalid;
        };
        if record.access_jti != claims.jti || record.user_id != claims.sub {
            // Superseded by a rotation
            return Validation::Invalid;
        }
        if claims.exp <= tables.now().timestamp() {
            return Validation::Expired;
        }
        match tables.users.get(&claims.sub) {
            Some(user) => Validation::Valid(SessionUser {
                id: claims.sub,
                email: user.email.clone(),
            }),
            None => Validation::Invalid,
        }
    }

    /// Identity the row-level policy sees for this token.
    fn policy_uid(&self, tables: &Tables, auth: &AccessToken) -> Option<UserId> {
        match self.check_token(tables, auth.as_str()) {
            Validation::Valid(user) => Some(user.id),
            _ => None,
        }
    }

    fn mint_access(
        &self,
        tables: &Tables,
        user_id: UserId,
        session_id: Uuid,
        jti: Uuid,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let email = tables
            .users
            .get(&user_id)
            .map(|u| u.email.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        let now = tables.now();
        // Whole seconds, matching the `exp` claim
        let expires_at = DateTime::from_timestamp((now + self.settings.access_ttl).timestamp(), 0)
            .unwrap_or(now);
        let claims = Claims {
            sub: user_id,
            email,
            sid: session_id,
            jti,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.signing_key),
        )
        .map_err(|e| AuthError::Rejected(format!("token signing failed: {}", e)))?;
        Ok((token, expires_at))
    }

    fn issue_session(&self, tables: &mut Tables, user_id: UserId) -> Result<Session, AuthError> {
        let session_id = Uuid::new_v4();
        let jti = Uuid::new_v4();
        let (access_token, expires_at) = self.mint_access(tables, user_id, session_id, jti)?;
        let refresh_token = self.random_token()?;
        let refresh_hash = hash_token(&refresh_token);

        tables.refresh_index.insert(refresh_hash.clone(), session_id);
        tables.sessions.insert(
            session_id,
            SessionRecord {
                user_id,
                access_jti: jti,
                refresh_hash,
                refresh_expires_at: tables.now() + self.settings.refresh_ttl,
            },
        );

        Ok(Session {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn issue_code(
        &self,
        tables: &mut Tables,
        user_id: UserId,
        purpose: EmailPurpose,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        let email = tables
            .users
            .get(&user_id)
            .map(|u| u.email.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        let code = self.random_token()?;
        let expires_at = tables.now() + self.settings.code_ttl;
        tables.codes.insert(
            code.clone(),
            CodeRecord {
                user_id,
                purpose,
                expires_at,
            },
        );
        let separator = if redirect_to.contains('?') { '&' } else { '?' };
        tables.outbox.push(OutboundEmail {
            to: email,
            purpose,
            link: format!("{}{}code={}", redirect_to, separator, code),
            code,
        });
        Ok(())
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash on the blocking pool; argon2 is deliberately slow.
async fn hash_password(password: &str, rng: &SystemRandom) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    rng.fill(&mut salt_bytes)
        .map_err(|_| AuthError::Rejected("random generator failure".to_string()))?;
    let password = password.to_string();
    tokio::task::spawn_blocking(move || -> Result<String, AuthError> {
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Rejected(e.to_string()))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Rejected(e.to_string()))?;
        Ok(hash.to_string())
    })
    .await
    .map_err(|e| AuthError::Remote(format!("password hashing task failed: {}", e)))?
}

async fn verify_password(hash: String, password: &str) -> bool {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .unwrap_or(false)
}

#[async_trait]
impl CredentialStore for MemoryBackend {
    async fn validate(&self, access_token: &str) -> Result<Validation, AuthError> {
        let tables = self.tables.lock().await;
        Ok(self.check_token(&tables, access_token))
    }

    async fn rotate(&self, refresh_token: &str) -> Result<(Session, SessionUser), AuthError> {
        let mut tables = self.tables.lock().await;
        let old_hash = hash_token(refresh_token);
        let session_id = *tables
            .refresh_index
            .get(&old_hash)
            .ok_or(AuthError::InvalidGrant)?;

        let (user_id, refresh_expires_at) = match tables.sessions.get(&session_id) {
            Some(record) => (record.user_id, record.refresh_expires_at),
            None => return Err(AuthError::InvalidGrant),
        };
        if refresh_expires_at <= tables.now() {
            tables.drop_session(session_id);
            return Err(AuthError::InvalidGrant);
        }

        let email = tables
            .users
            .get(&user_id)
            .map(|u| u.email.clone())
            .ok_or(AuthError::InvalidGrant)?;
        let jti = Uuid::new_v4();
        let (access_token, expires_at) = self.mint_access(&tables, user_id, session_id, jti)?;
        let new_refresh = self.random_token()?;
        let new_hash = hash_token(&new_refresh);
        let refresh_until = tables.now() + self.settings.refresh_ttl;

        tables.refresh_index.remove(&old_hash);
        tables.refresh_index.insert(new_hash.clone(), session_id);
        if let Some(record) = tables.sessions.get_mut(&session_id) {
            record.access_jti = jti;
            record.refresh_hash = new_hash;
            record.refresh_expires_at = refresh_until;
        }

        tracing::debug!(user_id = %user_id, "Session rotated");
        Ok((
            Session {
                access_token,
                refresh_token: new_refresh,
                expires_at,
            },
            SessionUser { id: user_id, email },
        ))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let email = normalize_email(email);
        let password_hash = hash_password(password, &self.rng).await?;

        let mut tables = self.tables.lock().await;
        if tables.users_by_email.contains_key(&email) {
            return Err(AuthError::UserExists);
        }

        let user_id = Uuid::new_v4();
        let confirmed = !self.settings.require_email_confirmation;
        tables.users.insert(
            user_id,
            UserRecord {
                email: email.clone(),
                password_hash,
                confirmed,
            },
        );
        tables.users_by_email.insert(email.clone(), user_id);

        // Profile trigger
        tables.profiles.insert(
            user_id,
            Profile::new_for_user(user_id, &email, display_name.map(str::to_string)),
        );
        tracing::info!(user_id = %user_id, "User created with profile");

        if confirmed {
            Ok(SignUpOutcome::SignedIn(self.issue_session(&mut tables, user_id)?))
        } else {
            self.issue_code(
                &mut tables,
                user_id,
                EmailPurpose::Confirmation,
                "/auth/callback?type=email",
            )?;
            Ok(SignUpOutcome::ConfirmationRequired)
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let (user_id, password_hash) = {
            let tables = self.tables.lock().await;
            let user_id = *tables
                .users_by_email
                .get(&email)
                .ok_or(AuthError::InvalidCredentials)?;
            let user = tables
                .users
                .get(&user_id)
                .ok_or(AuthError::InvalidCredentials)?;
            (user_id, user.password_hash.clone())
        };

        // Verified without the lock held
        if !verify_password(password_hash.clone(), password).await {
            return Err(AuthError::InvalidCredentials);
        }

        let mut tables = self.tables.lock().await;
        // The user may have been deleted or changed password meanwhile
        let user = tables
            .users
            .get(&user_id)
            .filter(|u| u.password_hash == password_hash)
            .ok_or(AuthError::InvalidCredentials)?;
        if !user.confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }

        self.issue_session(&mut tables, user_id)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let Some(claims) = self.decode_claims(access_token) else {
            return Ok(());
        };
        let mut tables = self.tables.lock().await;
        tables.drop_session(claims.sid);
        Ok(())
    }

    async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let mut tables = self.tables.lock().await;
        // Unknown addresses succeed silently
        let Some(&user_id) = tables.users_by_email.get(&email) else {
            return Ok(());
        };
        self.issue_code(&mut tables, user_id, EmailPurpose::Recovery, redirect_to)
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let password_hash = hash_password(new_password, &self.rng).await?;
        let mut tables = self.tables.lock().await;
        let user_id = match self.check_token(&tables, access_token) {
            Validation::Valid(user) => user.id,
            _ => return Err(AuthError::InvalidCredentials),
        };
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.password_hash = password_hash;
        }
        Ok(())
    }

    async fn exchange_code(&self, code: &str, kind: OtpKind) -> Result<Session, AuthError> {
        let mut tables = self.tables.lock().await;
        let expected = match kind {
            OtpKind::Email => EmailPurpose::Confirmation,
            OtpKind::Recovery => EmailPurpose::Recovery,
        };
        let now = tables.now();
        match tables.codes.get(code) {
            Some(record) if record.expires_at <= now => {
                tables.codes.remove(code);
                return Err(AuthError::InvalidGrant);
            }
            // A link opened with the wrong type leaves the code usable
            Some(record) if record.purpose == expected => {}
            _ => return Err(AuthError::InvalidGrant),
        }
        let record = tables.codes.remove(code).ok_or(AuthError::InvalidGrant)?;
        if record.purpose == EmailPurpose::Confirmation {
            if let Some(user) = tables.users.get_mut(&record.user_id) {
                user.confirmed = true;
            }
        }
        self.issue_session(&mut tables, record.user_id)
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), AuthError> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.remove(&user_id) {
            tables.users_by_email.remove(&user.email);
        }
        let sessions: Vec<Uuid> = tables
            .sessions
            .iter()
            .filter(|(_, s)| s.user_id == user_id)
            .map(|(id, _)| *id)
            .collect();
        for id in sessions {
            tables.drop_session(id);
        }
        tables.codes.retain(|_, c| c.user_id != user_id);

        // Cascade
        tables.profiles.remove(&user_id);
        tables.expenses.retain(|_, e| e.user_id != user_id);

        tracing::info!(user_id = %user_id, "User deleted with profile and records");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn get_profile(&self, auth: &AccessToken) -> Result<Option<Profile>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(self
            .policy_uid(&tables, auth)
            .and_then(|uid| tables.profiles.get(&uid).cloned()))
    }

    async fn update_profile(
        &self,
        auth: &AccessToken,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(uid) = self.policy_uid(&tables, auth) else {
            return Ok(None);
        };
        Ok(tables.profiles.get_mut(&uid).map(|profile| {
            profile.apply(update);
            profile.clone()
        }))
    }

    async fn list_expenses(
        &self,
        auth: &AccessToken,
        query: &ExpenseQuery,
    ) -> Result<Vec<Expense>, StoreError> {
        let tables = self.tables.lock().await;
        let Some(uid) = self.policy_uid(&tables, auth) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<Expense> = tables
            .expenses
            .values()
            .filter(|e| e.user_id == uid && query.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.spent_on
                .cmp(&a.spent_on)
                .then(b.created_at.cmp(&a.created_at))
        });
        rows.truncate(query.effective_limit() as usize);
        Ok(rows)
    }

    async fn get_expense(
        &self,
        auth: &AccessToken,
        id: Uuid,
    ) -> Result<Option<Expense>, StoreError> {
        let tables = self.tables.lock().await;
        let Some(uid) = self.policy_uid(&tables, auth) else {
            return Ok(None);
        };
        Ok(tables
            .expenses
            .get(&id)
            .filter(|e| e.user_id == uid)
            .cloned())
    }

    async fn create_expense(
        &self,
        auth: &AccessToken,
        expense: &NewExpense,
    ) -> Result<Expense, StoreError> {
        let mut tables = self.tables.lock().await;
        let uid = self
            .policy_uid(&tables, auth)
            .ok_or(StoreError::Unauthenticated)?;
        let now = Utc::now();
        let row = Expense {
            id: Uuid::new_v4(),
            user_id: uid,
            amount_cents: expense.amount_cents,
            category: expense.category.clone(),
            description: expense.description.clone(),
            spent_on: expense.spent_on,
            created_at: now,
            updated_at: now,
        };
        tables.expenses.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_expense(
        &self,
        auth: &AccessToken,
        id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<Option<Expense>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(uid) = self.policy_uid(&tables, auth) else {
            return Ok(None);
        };
        Ok(tables
            .expenses
            .get_mut(&id)
            .filter(|e| e.user_id == uid)
            .map(|e| {
                e.apply(update);
                e.clone()
            }))
    }

    async fn delete_expense(&self, auth: &AccessToken, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(uid) = self.policy_uid(&tables, auth) else {
            return Ok(false);
        };
        let owned = tables.expenses.get(&id).is_some_and(|e| e.user_id == uid);
        if owned {
            tables.expenses.remove(&id);
        }
        Ok(owned)
    }
}
