// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile and expense API tests.
//!
//! These tests verify that:
//! 1. Sign-up creates a profile with defaults, without any client call
//! 2. Expense CRUD works for the owner
//! 3. Another user never sees or touches the owner's rows
//! 4. Account deletion takes the profile and expenses with it
//! 5. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use expense_tracker::backend::RecordStore;
use expense_tracker::models::{AccessToken, ExpenseQuery, NewExpense};
use expense_tracker::session::codec::ACCESS_COOKIE;
use serde_json::json;

mod common;

use common::{body_json, cookie_value};

fn lunch() -> serde_json::Value {
    json!({
        "amount_cents": 1250,
        "category": "food",
        "description": "lunch",
        "spent_on": "2026-03-14"
    })
}

#[tokio::test]
async fn test_sign_up_creates_profile_with_defaults() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;

    let session = body_json(app.get("/auth/session", Some(&cookies)).await).await;
    let user_id = session["user"]["id"].as_str().unwrap().to_string();

    let response = app.get("/api/me", Some(&cookies)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;

    assert_eq!(profile["id"], user_id.as_str());
    assert_eq!(profile["email"], "a@example.com");
    assert_eq!(profile["subscription_tier"], "free");
    assert_eq!(profile["onboarding_completed"], false);
    assert_eq!(profile["preferences"], json!({}));
}

#[tokio::test]
async fn test_update_profile() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;

    let response = app
        .send_json(
            Method::PATCH,
            "/api/me",
            Some(&cookies),
            json!({
                "display_name": "Ada",
                "onboarding_completed": true,
                "preferences": { "currency": "EUR" }
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["display_name"], "Ada");
    assert_eq!(profile["onboarding_completed"], true);
    assert_eq!(profile["preferences"]["currency"], "EUR");
    // Not user-editable
    assert_eq!(profile["subscription_tier"], "free");

    let settings = body_json(app.get("/settings", Some(&cookies)).await).await;
    assert_eq!(settings["profile"]["display_name"], "Ada");
}

#[tokio::test]
async fn test_expense_crud() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;

    let response = app
        .send_json(Method::POST, "/api/expenses", Some(&cookies), lunch())
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["amount_cents"], 1250);

    let response = app.get(&format!("/api/expenses/{id}"), Some(&cookies)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send_json(
            Method::PATCH,
            &format!("/api/expenses/{id}"),
            Some(&cookies),
            json!({ "amount_cents": 1500 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["amount_cents"], 1500);
    assert_eq!(updated["category"], "food");

    let listed = body_json(app.get("/api/expenses", Some(&cookies)).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let page = body_json(app.get("/expenses", Some(&cookies)).await).await;
    assert_eq!(page["total_cents"], 1500);

    let response = app
        .send_empty(Method::DELETE, &format!("/api/expenses/{id}"), Some(&cookies))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&format!("/api/expenses/{id}"), Some(&cookies)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expense_filters() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;

    for (amount, category, day) in [
        (100, "food", "2026-01-05"),
        (200, "travel", "2026-01-10"),
        (300, "food", "2026-02-01"),
    ] {
        let response = app
            .send_json(
                Method::POST,
                "/api/expenses",
                Some(&cookies),
                json!({ "amount_cents": amount, "category": category, "spent_on": day }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let food = body_json(app.get("/api/expenses?category=food", Some(&cookies)).await).await;
    assert_eq!(food.as_array().unwrap().len(), 2);

    let january = body_json(
        app.get("/api/expenses?from=2026-01-01&to=2026-01-31", Some(&cookies))
            .await,
    )
    .await;
    assert_eq!(january.as_array().unwrap().len(), 2);

    let limited = body_json(app.get("/api/expenses?limit=1", Some(&cookies)).await).await;
    assert_eq!(limited.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_other_user_never_sees_records() {
    let app = common::create_test_app();
    let alice = app.sign_up("alice@example.com").await;
    let bob = app.sign_up("bob@example.com").await;

    let created = body_json(
        app.send_json(Method::POST, "/api/expenses", Some(&alice), lunch())
            .await,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let listed = body_json(app.get("/api/expenses", Some(&bob)).await).await;
    assert!(listed.as_array().unwrap().is_empty());

    let response = app.get(&format!("/api/expenses/{id}"), Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send_json(
            Method::PATCH,
            &format!("/api/expenses/{id}"),
            Some(&bob),
            json!({ "amount_cents": 1 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send_empty(Method::DELETE, &format!("/api/expenses/{id}"), Some(&bob))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Untouched for the owner
    let mine = body_json(app.get(&format!("/api/expenses/{id}"), Some(&alice)).await).await;
    assert_eq!(mine["amount_cents"], 1250);

    // Same answer straight from the store with Bob's token
    let bob_token = AccessToken::new(cookie_value(&bob, ACCESS_COOKIE).unwrap());
    let rows = app
        .backend
        .list_expenses(&bob_token, &ExpenseQuery::default())
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_delete_account_cascades() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;
    let token = AccessToken::new(cookie_value(&cookies, ACCESS_COOKIE).unwrap());

    app.send_json(Method::POST, "/api/expenses", Some(&cookies), lunch())
        .await;

    let response = app
        .send_empty(Method::DELETE, "/api/account", Some(&cookies))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    // Session is gone with the user
    let response = app.get("/", Some(&cookies)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    assert!(app.backend.get_profile(&token).await.unwrap().is_none());

    // The address can be registered again, with a fresh profile
    let cookies = app.sign_up("a@example.com").await;
    let listed = body_json(app.get("/api/expenses", Some(&cookies)).await).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = common::create_test_app();
    let response = app.get("/health", None).await;

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_cors_preflight_allows_site_origin() {
    let app = common::create_test_app();

    let response = app
        .request(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/expenses")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let app = common::create_test_app();

    let response = app
        .request(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/expenses")
                .header(header::ORIGIN, "https://evil.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_unrepresentable_total_is_an_error_response() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;
    let token = AccessToken::new(cookie_value(&cookies, ACCESS_COOKIE).unwrap());

    // Rows written straight to the store skip input validation
    for _ in 0..2 {
        app.backend
            .create_expense(
                &token,
                &NewExpense {
                    amount_cents: i64::MAX,
                    category: "imported".to_string(),
                    description: None,
                    spent_on: "2026-03-14".parse().unwrap(),
                },
            )
            .await
            .unwrap();
    }

    for page in ["/", "/expenses"] {
        let response = app.get(page, Some(&cookies)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "internal_error");
    }

    // The rows themselves are still listed
    let listed = body_json(app.get("/api/expenses", Some(&cookies)).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_patch_null_clears_description() {
    let app = common::create_test_app();
    let cookies = app.sign_up("a@example.com").await;

    let created = body_json(
        app.send_json(Method::POST, "/api/expenses", Some(&cookies), lunch())
            .await,
    )
    .await;
    assert_eq!(created["description"], "lunch");
    let uri = format!("/api/expenses/{}", created["id"].as_str().unwrap());

    // Absent leaves it alone
    let updated = body_json(
        app.send_json(Method::PATCH, &uri, Some(&cookies), json!({ "amount_cents": 300 }))
            .await,
    )
    .await;
    assert_eq!(updated["description"], "lunch");

    let updated = body_json(
        app.send_json(Method::PATCH, &uri, Some(&cookies), json!({ "description": null }))
            .await,
    )
    .await;
    assert!(updated["description"].is_null());
    assert_eq!(updated["amount_cents"], 300);
}
