//! Connection management endpoints and newsletter sign-up.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request},
};
use common::{response_json, TestApp, ADMIN_TOKEN, API_KEY, STORE_ID};
use meta_commerce_bridge::{
    entities::{meta::FacebookOrder, NewsletterSubscriber},
    services::system_config::paths,
};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

#[tokio::test]
async fn settings_round_trip_masks_the_token() {
    let app = TestApp::new().await;

    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/meta/settings",
            Some(json!({
                "store_id": STORE_ID,
                "access_token": "EAAB-very-secret",
                "pixel_id": "px_42",
                "catalog_id": "cat_7",
                "active": true,
                "order_status": "processing"
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["access_token"], "****cret");

    let response = app
        .admin_request(
            Method::GET,
            &format!("/api/v1/admin/meta/settings?store_id={}", STORE_ID),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["pixel_id"], "px_42");
    assert_eq!(body["data"]["order_status"], "processing");
    assert_eq!(body["data"]["active"], true);
    assert!(body["data"].get("api_key").is_none());
}

#[tokio::test]
async fn invalid_settings_return_generic_failure() {
    let app = TestApp::new().await;
    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/meta/settings",
            Some(json!({ "store_id": STORE_ID, "order_status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Something went wrong. Please try again.");
}

#[tokio::test]
async fn malformed_admin_requests_use_the_failure_envelope() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::post("/api/v1/admin/meta/settings")
                .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Something went wrong. Please try again.");

    let response = app
        .admin_request(Method::GET, "/api/v1/admin/meta/installed_features", None)
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Something went wrong. Please try again.");
}

#[tokio::test]
async fn installed_features_are_replaced_and_cleared_on_disconnect() {
    let app = TestApp::new().await;
    let features = json!({
        "store_id": STORE_ID,
        "features": [
            { "feature_instance_id": "fi_1", "feature_type": "pixel", "connected_assets": { "pixel_id": "px" } },
            { "feature_instance_id": "fi_2", "feature_type": "catalog" }
        ]
    });
    let response = app
        .admin_request(Method::POST, "/api/v1/admin/meta/installed_features", Some(features))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response_json(response).await["data"].as_array().map(Vec::len),
        Some(2)
    );

    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/meta/delete_connection",
            Some(json!({ "store_id": STORE_ID })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    // the seeded external business id was removed
    assert!(body["data"]["removed_settings"].as_u64().unwrap_or(0) >= 1);

    let response = app
        .admin_request(
            Method::GET,
            &format!("/api/v1/admin/meta/installed_features?store_id={}", STORE_ID),
            None,
        )
        .await;
    assert_eq!(
        response_json(response).await["data"].as_array().map(Vec::len),
        Some(0)
    );

    let response = app
        .meta_request(Method::POST, &app.meta_path("/carts"), None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn rotated_api_key_replaces_the_configured_one() {
    let app = TestApp::new().await;
    let response = app
        .admin_request(Method::POST, "/api/v1/admin/meta/api_key", None)
        .await;
    assert_eq!(response.status(), 200);
    let new_key = response_json(response).await["data"]["api_key"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(new_key.len(), 64);
    assert_ne!(new_key, API_KEY);

    // the harness still signs with the configured key
    let response = app
        .meta_request(Method::GET, &app.meta_path("/health_check"), None)
        .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn shipping_sync_without_integration_fails_generically() {
    let app = TestApp::new().await;
    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/meta/shipping_sync",
            Some(json!({ "store_id": STORE_ID })),
        )
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(response_json(response).await["success"], false);
}

#[tokio::test]
async fn newsletter_subscription_issues_coupon_once() {
    let app = TestApp::new().await;
    let rule_id = app.seed_percent_rule(dec!(15), 1).await;
    app.system_config
        .set(STORE_ID, paths::NEWSLETTER_RULE_ID, Some(&rule_id.to_string()))
        .await
        .unwrap();

    let response = app
        .meta_request(
            Method::POST,
            &app.meta_path("/newsletter"),
            Some(json!({ "email": "  Fan@Example.com " })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["email"], "fan@example.com");
    assert!(body["coupon_code"].is_string());

    let response = app
        .meta_request(
            Method::POST,
            &app.meta_path("/newsletter"),
            Some(json!({ "email": "fan@example.com" })),
        )
        .await;
    assert_eq!(response.status(), 409);

    let subscribers = NewsletterSubscriber::find().count(app.db()).await.unwrap();
    assert_eq!(subscribers, 1);
    assert_eq!(FacebookOrder::find().count(app.db()).await.unwrap(), 0);
}
