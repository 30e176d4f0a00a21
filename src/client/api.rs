// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the expense tracker server.
//!
//! The session lives in `HttpOnly` cookies that the client stores and replays
//! but never reads. Redirects are not followed: a redirect to the login page
//! means the server no longer sees a session.

use crate::backend::OtpKind;
use crate::client::ClientError;
use crate::models::{
    AuthResponse, AuthStatus, Expense, ExpenseQuery, ExpenseUpdate, NewExpense, NewPasswordForm,
    PasswordResetForm, Profile, ProfileUpdate, SessionInfo, SignInForm, SignUpForm,
};
use reqwest::{header, Response, StatusCode, Url};
use crate::session::gate::LOGIN_PATH;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

/// Error body returned by the server.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    field: Option<String>,
    details: Option<String>,
}

/// Where an emailed link led.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub kind: OtpKind,
    /// Page the server redirected to
    pub next: String,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::Remote(format!("invalid base URL: {e}")))?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { base, http })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Remote(format!("invalid path {path}: {e}")))
    }

    // ─── Auth ────────────────────────────────────────────────

    pub async fn session(&self) -> Result<SessionInfo, ClientError> {
        let resp = self.http.get(self.url("/auth/session")?).send().await?;
        json(resp).await
    }

    pub async fn sign_up(&self, form: &SignUpForm) -> Result<AuthStatus, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/signup")?)
            .json(form)
            .send()
            .await?;
        Ok(json::<AuthResponse>(resp).await?.status)
    }

    pub async fn sign_in(&self, form: &SignInForm) -> Result<AuthStatus, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/login")?)
            .json(form)
            .send()
            .await?;
        Ok(json::<AuthResponse>(resp).await?.status)
    }

    /// Ask the server to revoke the session and clear the cookies.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let resp = self.http.post(self.url("/auth/signout")?).send().await?;
        if resp.status().is_success() || resp.status().is_redirection() {
            Ok(())
        } else {
            Err(error_from(resp).await)
        }
    }

    pub async fn request_password_reset(&self, form: &PasswordResetForm) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/reset-password")?)
            .json(form)
            .send()
            .await?;
        json::<AuthResponse>(resp).await.map(|_| ())
    }

    pub async fn update_password(&self, form: &NewPasswordForm) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/update-password")?)
            .json(form)
            .send()
            .await?;
        json::<AuthResponse>(resp).await.map(|_| ())
    }

    /// Open a confirmation or recovery link from an email. Only the link's
    /// path and query are used; the request goes to this client's server.
    pub async fn open_link(&self, link: &str) -> Result<LinkOutcome, ClientError> {
        let target = self.url(link)?;
        let target = self.url(&match target.query() {
            Some(query) => format!("{}?{}", target.path(), query),
            None => target.path().to_string(),
        })?;
        let kind = match target.query_pairs().find(|(k, _)| k == "type") {
            Some((_, v)) if v == "recovery" => OtpKind::Recovery,
            _ => OtpKind::Email,
        };

        let resp = self.http.get(target).send().await?;
        if !resp.status().is_redirection() {
            return Err(error_from(resp).await);
        }
        let next = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        // A rejected code lands back on the login page
        if next.starts_with(LOGIN_PATH) {
            return Err(ClientError::Auth("link is invalid or expired".to_string()));
        }
        Ok(LinkOutcome { kind, next })
    }

    // ─── Profile ─────────────────────────────────────────────

    /// The caller's profile, or `None` when signed out.
    pub async fn profile(&self) -> Result<Option<Profile>, ClientError> {
        let resp = self.http.get(self.url("/api/me")?).send().await?;
        match json(resp).await {
            Ok(profile) => Ok(Some(profile)),
            Err(ClientError::Auth(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientError> {
        let resp = self
            .http
            .patch(self.url("/api/me")?)
            .json(update)
            .send()
            .await?;
        json(resp).await
    }

    pub async fn delete_account(&self) -> Result<(), ClientError> {
        let resp = self.http.delete(self.url("/api/account")?).send().await?;
        json::<serde_json::Value>(resp).await.map(|_| ())
    }

    // ─── Expenses ────────────────────────────────────────────

    pub async fn list_expenses(&self, query: &ExpenseQuery) -> Result<Vec<Expense>, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/expenses")?)
            .query(query)
            .send()
            .await?;
        json(resp).await
    }

    pub async fn get_expense(&self, id: Uuid) -> Result<Expense, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/expenses/{id}"))?)
            .send()
            .await?;
        json(resp).await
    }

    pub async fn create_expense(&self, expense: &NewExpense) -> Result<Expense, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/expenses")?)
            .json(expense)
            .send()
            .await?;
        json(resp).await
    }

    pub async fn update_expense(
        &self,
        id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<Expense, ClientError> {
        let resp = self
            .http
            .patch(self.url(&format!("/api/expenses/{id}"))?)
            .json(update)
            .send()
            .await?;
        json(resp).await
    }

    pub async fn delete_expense(&self, id: Uuid) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/expenses/{id}"))?)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_from(resp).await)
        }
    }
}

async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    if resp.status().is_success() {
        Ok(resp.json::<T>().await?)
    } else {
        Err(error_from(resp).await)
    }
}

async fn error_from(resp: Response) -> ClientError {
    let status = resp.status();
    if status.is_redirection() {
        // The gate sends signed-out requests for protected paths to login
        return ClientError::Auth("signed out".to_string());
    }

    let body: ErrorBody = resp.json().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(body.error),
        StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation {
            field: body.field.unwrap_or_default(),
            message: body.details.unwrap_or(body.error),
        },
        _ => ClientError::Remote(match body.details {
            Some(details) => format!("{status}: {} ({details})", body.error),
            None => format!("{status}: {}", body.error),
        }),
    }
}
