// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the hosted backend project.
//!
//! Auth calls go to the GoTrue-compatible endpoints under `/auth/v1`, record
//! calls to the PostgREST-compatible endpoints under `/rest/v1`. Record calls
//! forward the caller's bearer token so the project's row-level policies
//! decide what is visible. Only [`CredentialStore::delete_user`] uses the
//! service-role key.

use super::{
    tables, AuthError, CredentialStore, OtpKind, RecordStore, SignUpOutcome, StoreError,
    Validation,
};
use crate::config::{Config, ServiceRoleKey};
use crate::models::{
    AccessToken, Expense, ExpenseQuery, ExpenseUpdate, NewExpense, Profile, ProfileUpdate,
    Session, SessionUser, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Hosted backend client.
#[derive(Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: ServiceRoleKey,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<UserResponse>,
}

impl TokenResponse {
    /// Identity carried by the response, or read from the new access token.
    fn session_user(&self) -> Option<SessionUser> {
        match &self.user {
            Some(user) => Some(SessionUser {
                id: user.id,
                email: user.email.clone().unwrap_or_default(),
            }),
            None => peek_claims(&self.access_token).map(|c| SessionUser {
                id: c.sub,
                email: String::new(),
            }),
        }
    }

    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            })
            .unwrap_or_else(Utc::now);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// `GET /auth/v1/user` response (subset).
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Error body returned by the auth endpoints.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl AuthErrorBody {
    fn message(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_default()
    }
}

/// Claims read from access tokens without verifying the signature.
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    sub: Uuid,
    exp: i64,
}

/// Read `sub`/`exp` from a JWT. Signature checks are left to the backend.
fn peek_claims(token: &str) -> Option<UnverifiedClaims> {
    let mut validation = jsonwebtoken::Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    decode::<UnverifiedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

/// Map a failed auth response to an [`AuthError`].
fn auth_error(status: StatusCode, body: &AuthErrorBody) -> AuthError {
    let code = body.error_code.as_deref().unwrap_or_default();
    let message = body.message();
    let lower = message.to_lowercase();

    if code == "user_already_exists" || lower.contains("already registered") {
        return AuthError::UserExists;
    }
    if code == "email_not_confirmed" || lower.contains("email not confirmed") {
        return AuthError::EmailNotConfirmed;
    }
    if code == "invalid_credentials" || lower.contains("invalid login credentials") {
        return AuthError::InvalidCredentials;
    }
    if code == "refresh_token_not_found"
        || code == "refresh_token_already_used"
        || body.error.as_deref() == Some("invalid_grant")
    {
        return AuthError::InvalidGrant;
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AuthError::InvalidCredentials;
    }
    if status.is_server_error() {
        return AuthError::Remote(format!("HTTP {}: {}", status, message));
    }
    AuthError::Rejected(format!("HTTP {}: {}", status, message))
}

impl RestBackend {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        service_role_key: ServiceRoleKey,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            service_role_key,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.backend_url,
            &config.anon_key,
            config.service_role_key.clone(),
            config.auth_timeout,
        )
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn anon(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    fn as_user(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        self.anon(builder).bearer_auth(token)
    }

    /// Send an auth request and parse a JSON body on success.
    async fn auth_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Remote(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body: AuthErrorBody = response.json().await.unwrap_or_default();
            return Err(auth_error(status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::Remote(format!("JSON parse error: {}", e)))
    }

    /// Send an auth request whose body we don't need.
    async fn auth_send(&self, request: reqwest::RequestBuilder) -> Result<StatusCode, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Remote(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }
        let body: AuthErrorBody = response.json().await.unwrap_or_default();
        Err(auth_error(status, &body))
    }

    /// Send a record request and parse the JSON rows.
    async fn rows<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(StoreError::Remote(format!("HTTP {}: {}", status, body)));
            }
            return Err(StoreError::Rejected(format!("HTTP {}: {}", status, body)));
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Remote(format!("JSON parse error: {}", e)))
    }

    /// Identity used as the row filter for writes. The backend still checks it.
    fn subject(auth: &AccessToken) -> Result<Uuid, StoreError> {
        peek_claims(auth.as_str())
            .map(|c| c.sub)
            .ok_or(StoreError::Unauthenticated)
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpData<'a>,
}

#[derive(Serialize)]
struct SignUpData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

/// Sign-up returns a session when confirmation is off, a bare user otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(serde_json::Value),
}

#[async_trait]
impl CredentialStore for RestBackend {
    async fn validate(&self, access_token: &str) -> Result<Validation, AuthError> {
        let Some(claims) = peek_claims(access_token) else {
            return Ok(Validation::Invalid);
        };
        if claims.exp <= Utc::now().timestamp() {
            return Ok(Validation::Expired);
        }

        let response = self
            .as_user(self.http.get(self.auth_url("user")), access_token)
            .send()
            .await
            .map_err(|e| AuthError::Remote(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {
                let user: UserResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::Remote(format!("JSON parse error: {}", e)))?;
                Ok(Validation::Valid(SessionUser {
                    id: user.id,
                    email: user.email.unwrap_or_default(),
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Ok(Validation::Invalid)
            }
            s => Err(AuthError::Remote(format!("HTTP {} validating token", s))),
        }
    }

    async fn rotate(&self, refresh_token: &str) -> Result<(Session, SessionUser), AuthError> {
        let request = self
            .anon(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let tokens: TokenResponse = self.auth_json(request).await.map_err(|e| match e {
            // Any client error on refresh means the grant is unusable
            AuthError::Rejected(_) | AuthError::InvalidCredentials => AuthError::InvalidGrant,
            other => other,
        })?;
        let user = tokens
            .session_user()
            .ok_or_else(|| AuthError::Remote("token response without user".to_string()))?;
        Ok((tokens.into_session(), user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let request = self.anon(self.http.post(self.auth_url("signup"))).json(&SignUpBody {
            email,
            password,
            data: SignUpData { display_name },
        });
        match self.auth_json::<SignUpResponse>(request).await? {
            SignUpResponse::Session(tokens) => Ok(SignUpOutcome::SignedIn(tokens.into_session())),
            SignUpResponse::User(_) => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let request = self
            .anon(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });
        let tokens: TokenResponse = self.auth_json(request).await.map_err(|e| match e {
            AuthError::InvalidGrant => AuthError::InvalidCredentials,
            other => other,
        })?;
        Ok(tokens.into_session())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let request = self.as_user(self.http.post(self.auth_url("logout")), access_token);
        match self.auth_send(request).await {
            Ok(_) => Ok(()),
            // Already gone
            Err(AuthError::InvalidCredentials)
            | Err(AuthError::Rejected(_))
            | Err(AuthError::InvalidGrant) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        let url = format!(
            "{}?redirect_to={}",
            self.auth_url("recover"),
            urlencoding::encode(redirect_to)
        );
        let request = self
            .anon(self.http.post(url))
            .json(&serde_json::json!({ "email": email }));
        self.auth_send(request).await.map(|_| ())
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let request = self
            .as_user(self.http.put(self.auth_url("user")), access_token)
            .json(&serde_json::json!({ "password": new_password }));
        self.auth_send(request).await.map(|_| ())
    }

    async fn exchange_code(&self, code: &str, kind: OtpKind) -> Result<Session, AuthError> {
        let request = self
            .anon(self.http.post(self.auth_url("verify")))
            .json(&serde_json::json!({ "token_hash": code, "type": kind }));
        let tokens: TokenResponse = self.auth_json(request).await.map_err(|e| match e {
            AuthError::Rejected(_) => AuthError::InvalidGrant,
            other => other,
        })?;
        Ok(tokens.into_session())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), AuthError> {
        let key = self.service_role_key.expose();
        let request = self
            .http
            .delete(self.auth_url(&format!("admin/users/{}", user_id)))
            .header("apikey", key)
            .bearer_auth(key);
        self.auth_send(request).await?;
        tracing::info!(user_id = %user_id, "User deleted via admin API");
        Ok(())
    }
}

/// Body for inserting an expense. `user_id` defaults to the caller server side.
#[derive(Serialize)]
struct ExpenseInsert<'a> {
    amount_cents: i64,
    category: &'a str,
    description: Option<&'a str>,
    spent_on: chrono::NaiveDate,
}

fn expense_filters(query: &ExpenseQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("order", "spent_on.desc,created_at.desc".to_string()),
        ("limit", query.effective_limit().to_string()),
    ];
    if let Some(category) = &query.category {
        params.push(("category", format!("eq.{}", category)));
    }
    if let Some(from) = query.from {
        params.push(("spent_on", format!("gte.{}", from)));
    }
    if let Some(to) = query.to {
        params.push(("spent_on", format!("lte.{}", to)));
    }
    params
}

#[async_trait]
impl RecordStore for RestBackend {
    async fn get_profile(&self, auth: &AccessToken) -> Result<Option<Profile>, StoreError> {
        let request = self
            .as_user(self.http.get(self.rest_url(tables::PROFILES)), auth.as_str())
            .query(&[("select", "*"), ("limit", "1")]);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn update_profile(
        &self,
        auth: &AccessToken,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError> {
        let uid = Self::subject(auth)?;
        let request = self
            .as_user(self.http.patch(self.rest_url(tables::PROFILES)), auth.as_str())
            .query(&[("id", format!("eq.{}", uid))])
            .header("Prefer", "return=representation")
            .json(update);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn list_expenses(
        &self,
        auth: &AccessToken,
        query: &ExpenseQuery,
    ) -> Result<Vec<Expense>, StoreError> {
        let request = self
            .as_user(self.http.get(self.rest_url(tables::EXPENSES)), auth.as_str())
            .query(&expense_filters(query));
        self.rows(request).await
    }

    async fn get_expense(
        &self,
        auth: &AccessToken,
        id: Uuid,
    ) -> Result<Option<Expense>, StoreError> {
        let request = self
            .as_user(self.http.get(self.rest_url(tables::EXPENSES)), auth.as_str())
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn create_expense(
        &self,
        auth: &AccessToken,
        expense: &NewExpense,
    ) -> Result<Expense, StoreError> {
        let request = self
            .as_user(self.http.post(self.rest_url(tables::EXPENSES)), auth.as_str())
            .header("Prefer", "return=representation")
            .json(&ExpenseInsert {
                amount_cents: expense.amount_cents,
                category: &expense.category,
                description: expense.description.as_deref(),
                spent_on: expense.spent_on,
            });
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected("insert returned no row".to_string()))
    }

    async fn update_expense(
        &self,
        auth: &AccessToken,
        id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<Option<Expense>, StoreError> {
        let request = self
            .as_user(self.http.patch(self.rest_url(tables::EXPENSES)), auth.as_str())
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(update);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn delete_expense(&self, auth: &AccessToken, id: Uuid) -> Result<bool, StoreError> {
        let request = self
            .as_user(self.http.delete(self.rest_url(tables::EXPENSES)), auth.as_str())
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");
        let deleted: Vec<Expense> = self.rows(request).await?;
        Ok(!deleted.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, Method},
        routing::{any, get, post},
        Json, Router,
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn token(sub: Uuid, exp_offset_secs: i64) -> String {
        let claims = serde_json::json!({
            "sub": sub,
            "exp": Utc::now().timestamp() + exp_offset_secs,
            "role": "authenticated",
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"backend-secret"),
        )
        .unwrap()
    }

    /// Minimal stand-in for the hosted auth endpoints.
    async fn fake_backend() -> String {
        let app = Router::new()
            .route(
                "/auth/v1/user",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    let token = auth.trim_start_matches("Bearer ");
                    let claims = peek_claims(token).ok_or(StatusCode::UNAUTHORIZED)?;
                    Ok::<_, StatusCode>(Json(serde_json::json!({
                        "id": claims.sub,
                        "email": "a@example.com",
                    })))
                }),
            )
            .route(
                "/auth/v1/token",
                post(
                    |Query(q): Query<HashMap<String, String>>,
                     Json(body): Json<serde_json::Value>| async move {
                        let grant = q.get("grant_type").cloned().unwrap_or_default();
                        if grant == "refresh_token" && body["refresh_token"] == "good" {
                            return (
                                StatusCode::OK,
                                Json(serde_json::json!({
                                    "access_token": "new-access",
                                    "refresh_token": "new-refresh",
                                    "expires_in": 3600,
                                    "user": {
                                        "id": "6f1c2d3e-0000-4000-8000-000000000001",
                                        "email": "a@example.com",
                                    },
                                })),
                            );
                        }
                        if grant == "password" {
                            return (
                                StatusCode::BAD_REQUEST,
                                Json(serde_json::json!({
                                    "error_code": "invalid_credentials",
                                    "msg": "Invalid login credentials",
                                })),
                            );
                        }
                        (
                            StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({
                                "error_code": "refresh_token_not_found",
                                "msg": "Invalid Refresh Token: Refresh Token Not Found",
                            })),
                        )
                    },
                ),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    const EXPENSE_ID: &str = "0b7e5a52-0000-4000-8000-00000000e001";

    /// One request seen by the fake record endpoints.
    #[derive(Debug, Clone)]
    struct Seen {
        method: Method,
        table: String,
        params: Vec<(String, String)>,
        prefer: Option<String>,
        body: Value,
    }

    type SeenLog = Arc<Mutex<Vec<Seen>>>;

    fn param<'a>(seen: &'a Seen, name: &str) -> Vec<&'a str> {
        seen.params
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn expense_row(owner: Uuid, body: &Value) -> Value {
        json!({
            "id": EXPENSE_ID,
            "user_id": owner,
            "amount_cents": body.get("amount_cents").cloned().unwrap_or(json!(1250)),
            "category": body.get("category").cloned().unwrap_or(json!("food")),
            "description": body.get("description").cloned().unwrap_or(json!("lunch")),
            "spent_on": body.get("spent_on").cloned().unwrap_or(json!("2026-03-14")),
            "created_at": "2026-03-14T12:00:00Z",
            "updated_at": "2026-03-14T12:00:00Z",
        })
    }

    /// Stand-in for the record endpoints. Rows belong to whoever the bearer
    /// token names; requests without the anon key or a readable token are
    /// refused the way the hosted project refuses them.
    async fn record_endpoint(
        State(log): State<SeenLog>,
        method: Method,
        Path(table): Path<String>,
        Query(params): Query<Vec<(String, String)>>,
        headers: HeaderMap,
        body: String,
    ) -> Result<Json<Value>, StatusCode> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        if header("apikey").as_deref() != Some("anon") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let bearer = header("authorization").unwrap_or_default();
        let owner = peek_claims(bearer.trim_start_matches("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?
            .sub;
        let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

        let seen = Seen {
            method: method.clone(),
            table: table.clone(),
            params,
            prefer: header("prefer"),
            body: body.clone(),
        };
        let id_filter = param(&seen, "id").first().map(|v| v.to_string());
        log.lock().unwrap().push(seen);

        let rows = match (table.as_str(), method) {
            ("profiles", Method::GET) => json!([{
                "id": owner,
                "email": "a@example.com",
                "display_name": null,
                "created_at": "2026-03-01T00:00:00Z",
                "updated_at": "2026-03-01T00:00:00Z",
            }]),
            ("profiles", Method::PATCH) if id_filter == Some(format!("eq.{owner}")) => json!([{
                "id": owner,
                "email": "a@example.com",
                "display_name": body["display_name"],
                "created_at": "2026-03-01T00:00:00Z",
                "updated_at": "2026-03-02T00:00:00Z",
            }]),
            ("expenses", Method::POST) => json!([expense_row(owner, &body)]),
            ("expenses", Method::GET) if id_filter.is_none() => {
                json!([expense_row(owner, &Value::Null)])
            }
            ("expenses", _) if id_filter == Some(format!("eq.{EXPENSE_ID}")) => {
                json!([expense_row(owner, &body)])
            }
            _ => json!([]),
        };
        Ok(Json(rows))
    }

    async fn fake_records() -> (String, SeenLog) {
        let log = SeenLog::default();
        let app = Router::new()
            .route("/rest/v1/{table}", any(record_endpoint))
            .with_state(log.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), log)
    }

    fn client(base_url: &str) -> RestBackend {
        RestBackend::new(
            base_url,
            "anon",
            ServiceRoleKey::new("service"),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_peek_claims() {
        let sub = Uuid::new_v4();
        let claims = peek_claims(&token(sub, 60)).unwrap();
        assert_eq!(claims.sub, sub);
        assert!(peek_claims("garbage").is_none());
    }

    #[test]
    fn test_auth_error_mapping() {
        let body = AuthErrorBody {
            error_code: Some("user_already_exists".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            auth_error(StatusCode::UNPROCESSABLE_ENTITY, &body),
            AuthError::UserExists
        ));

        let body = AuthErrorBody {
            error: Some("invalid_grant".to_string()),
            error_description: Some("Email not confirmed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            auth_error(StatusCode::BAD_REQUEST, &body),
            AuthError::EmailNotConfirmed
        ));

        assert!(matches!(
            auth_error(StatusCode::BAD_GATEWAY, &AuthErrorBody::default()),
            AuthError::Remote(_)
        ));
    }

    #[test]
    fn test_expense_filters() {
        let query = ExpenseQuery {
            category: Some("food".to_string()),
            from: Some("2026-01-01".parse().unwrap()),
            to: Some("2026-01-31".parse().unwrap()),
            limit: None,
        };
        let params = expense_filters(&query);
        assert!(params.contains(&("category", "eq.food".to_string())));
        assert!(params.contains(&("spent_on", "gte.2026-01-01".to_string())));
        assert!(params.contains(&("spent_on", "lte.2026-01-31".to_string())));
        assert!(params.contains(&("limit", "100".to_string())));
    }

    #[tokio::test]
    async fn test_validate_against_backend() {
        let base = fake_backend().await;
        let backend = client(&base);
        let sub = Uuid::new_v4();

        match backend.validate(&token(sub, 3600)).await.unwrap() {
            Validation::Valid(user) => assert_eq!(user.id, sub),
            other => panic!("expected valid, got {:?}", other),
        }

        // Expired tokens are recognised without a round trip
        assert_eq!(
            backend.validate(&token(sub, -10)).await.unwrap(),
            Validation::Expired
        );
        assert_eq!(
            backend.validate("not-a-jwt").await.unwrap(),
            Validation::Invalid
        );
    }

    #[tokio::test]
    async fn test_rotate_against_backend() {
        let base = fake_backend().await;
        let backend = client(&base);

        let (session, user) = backend.rotate("good").await.unwrap();
        assert_eq!(user.email, "a@example.com");
        assert_eq!(session.access_token, "new-access");
        assert_eq!(session.refresh_token, "new-refresh");
        assert!(session.expires_at > Utc::now());

        assert!(matches!(
            backend.rotate("stale").await,
            Err(AuthError::InvalidGrant)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_bad_password() {
        let base = fake_backend().await;
        let backend = client(&base);
        assert!(matches!(
            backend.sign_in("a@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_remote_error() {
        // Port 9 (discard) is not listening
        let backend = client("http://127.0.0.1:9");
        assert!(matches!(
            backend.rotate("good").await,
            Err(AuthError::Remote(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_calls_carry_the_callers_token() {
        let (base, log) = fake_records().await;
        let backend = client(&base);
        let sub = Uuid::new_v4();
        let auth = AccessToken::new(token(sub, 3600));

        let profile = backend.get_profile(&auth).await.unwrap().unwrap();
        assert_eq!(profile.id, sub);

        let updated = backend
            .update_profile(
                &auth,
                &ProfileUpdate {
                    display_name: Some("Ada".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ada"));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].method, Method::GET);
        assert_eq!(param(&log[0], "limit"), vec!["1"]);
        // Writes are filtered to the token's own row
        assert_eq!(log[1].method, Method::PATCH);
        assert_eq!(param(&log[1], "id"), vec![format!("eq.{sub}").as_str()]);
        assert_eq!(log[1].prefer.as_deref(), Some("return=representation"));
        assert_eq!(log[1].body, json!({ "display_name": "Ada" }));
    }

    #[tokio::test]
    async fn test_expense_calls_against_backend() {
        let (base, log) = fake_records().await;
        let backend = client(&base);
        let sub = Uuid::new_v4();
        let auth = AccessToken::new(token(sub, 3600));
        let id: Uuid = EXPENSE_ID.parse().unwrap();

        let created = backend
            .create_expense(
                &auth,
                &NewExpense {
                    amount_cents: 899,
                    category: "books".to_string(),
                    description: None,
                    spent_on: "2026-04-01".parse().unwrap(),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.user_id, sub);
        assert_eq!(created.amount_cents, 899);

        let listed = backend
            .list_expenses(
                &auth,
                &ExpenseQuery {
                    category: Some("books".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        assert!(backend.get_expense(&auth, id).await.unwrap().is_some());
        assert!(backend
            .get_expense(&auth, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());

        let updated = backend
            .update_expense(
                &auth,
                id,
                &ExpenseUpdate {
                    description: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.description, None);

        assert!(backend.delete_expense(&auth, id).await.unwrap());
        assert!(!backend.delete_expense(&auth, Uuid::new_v4()).await.unwrap());

        let log = log.lock().unwrap();
        assert!(log.iter().all(|s| s.table == "expenses"));

        let insert = &log[0];
        assert_eq!(insert.method, Method::POST);
        assert_eq!(insert.prefer.as_deref(), Some("return=representation"));
        // The owner is assigned server side
        assert!(insert.body.get("user_id").is_none());

        let list = &log[1];
        assert_eq!(param(list, "category"), vec!["eq.books"]);
        assert_eq!(param(list, "order"), vec!["spent_on.desc,created_at.desc"]);

        assert_eq!(param(&log[2], "id"), vec![format!("eq.{id}").as_str()]);

        let patch = &log[4];
        assert_eq!(patch.method, Method::PATCH);
        assert_eq!(param(patch, "id"), vec![format!("eq.{id}").as_str()]);
        assert_eq!(patch.body, json!({ "description": null }));

        let delete = &log[5];
        assert_eq!(delete.method, Method::DELETE);
        assert_eq!(delete.prefer.as_deref(), Some("return=representation"));
    }

    #[tokio::test]
    async fn test_record_calls_without_valid_token() {
        let (base, log) = fake_records().await;
        let backend = client(&base);
        let garbage = AccessToken::new("not-a-jwt");

        assert!(matches!(
            backend.list_expenses(&garbage, &ExpenseQuery::default()).await,
            Err(StoreError::Unauthenticated)
        ));
        // Refused locally, nothing sent
        assert!(matches!(
            backend
                .update_profile(&garbage, &ProfileUpdate::default())
                .await,
            Err(StoreError::Unauthenticated)
        ));
        assert!(log.lock().unwrap().is_empty());

        // Wrong project key
        let other = RestBackend::new(
            &base,
            "someone-else",
            ServiceRoleKey::new("service"),
            Duration::from_secs(2),
        )
        .unwrap();
        let auth = AccessToken::new(token(Uuid::new_v4(), 3600));
        assert!(matches!(
            other.get_profile(&auth).await,
            Err(StoreError::Unauthenticated)
        ));
    }
}
