// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use expense_tracker::backend::MemoryBackend;
use expense_tracker::config::Config;
use expense_tracker::routes::create_router;
use expense_tracker::AppState;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Password used by the sign-up helpers.
#[allow(dead_code)]
pub const PASSWORD: &str = "correct horse battery";

/// Router wired to an in-memory backend the test can poke at directly.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub backend: MemoryBackend,
}

/// Create a test app with the default config and an empty backend.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default(), MemoryBackend::default())
}

#[allow(dead_code)]
pub fn create_test_app_with_site_url(site_url: &str) -> TestApp {
    let mut config = Config::test_default();
    config.site_url = site_url.to_string();
    create_test_app_with(config, MemoryBackend::default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config, backend: MemoryBackend) -> TestApp {
    let state = Arc::new(AppState::with_memory_backend(config, backend.clone()));
    TestApp {
        router: create_router(state.clone()),
        state,
        backend,
    }
}

#[allow(dead_code)]
impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookies: Option<&str>) -> Response {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn send_json(
        &self,
        method: Method,
        uri: &str,
        cookies: Option<&str>,
        body: Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn send_empty(&self, method: Method, uri: &str, cookies: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    /// Sign up through the API and return the resulting `Cookie` header.
    pub async fn sign_up(&self, email: &str) -> String {
        let response = self
            .send_json(
                Method::POST,
                "/auth/signup",
                None,
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert!(
            response.status().is_success(),
            "sign-up failed: {}",
            response.status()
        );
        apply_set_cookies("", &response)
    }

    /// Sign in through the API and return the resulting `Cookie` header.
    pub async fn sign_in(&self, email: &str, password: &str) -> String {
        let response = self
            .send_json(
                Method::POST,
                "/auth/login",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert!(
            response.status().is_success(),
            "sign-in failed: {}",
            response.status()
        );
        apply_set_cookies("", &response)
    }
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .rev()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Value of a cookie in a `Cookie` request header.
#[allow(dead_code)]
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split("; ")
        .filter_map(|pair| pair.split_once('='))
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
}

/// Update a `Cookie` request header the way a browser would from a
/// response's `Set-Cookie` headers, in order.
#[allow(dead_code)]
pub fn apply_set_cookies(cookies: &str, response: &Response) -> String {
    let mut jar: Vec<(String, String)> = cookies
        .split("; ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect();

    for set_cookie in set_cookie_headers(response) {
        let pair = set_cookie.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        jar.retain(|(n, _)| n != name);
        if !set_cookie.contains("Max-Age=0") {
            jar.push((name.to_string(), value.to_string()));
        }
    }

    jar.iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[allow(dead_code)]
pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap())
        .unwrap_or_default()
}
