//! Graph API client and shipping profile upload against a mock Meta.

mod common;

use axum::http::Method;
use common::{response_json, TestApp, STORE_ID};
use meta_commerce_bridge::services::{
    meta::{GraphApiClient, GraphApiError},
    system_config::paths,
};
use reqwest::Client;
use serde_json::json;
use wiremock::{
    matchers::{body_string, body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> GraphApiClient {
    GraphApiClient::with_client(Client::new(), server.uri(), "v20.0", "token-123", true)
}

#[tokio::test]
async fn fbe_installs_are_requested_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v20.0/fbe_business/fbe_installs"))
        .and(query_param("fbe_external_business_id", "biz_1"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "pixel_id": "px" }] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let installs = client(&server).get_fbe_installs("biz_1").await.unwrap();
    assert_eq!(installs["data"][0]["pixel_id"], "px");
}

#[tokio::test]
async fn graph_errors_surface_the_meta_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v20.0/cat_1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Invalid OAuth access token", "code": 190 }
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_catalog_info("cat_1").await.unwrap_err();
    match err {
        GraphApiError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid OAuth access token");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn pixel_events_are_posted_as_a_json_data_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v20.0/px_9/events"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string(
            "data=%5B%7B%22event_name%22%3A%22Purchase%22%7D%5D",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "events_received": 1 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server)
        .send_pixel_events("px_9", &[json!({ "event_name": "Purchase" })])
        .await
        .unwrap();
    assert_eq!(reply["events_received"], 1);
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v20.0/commerce_seller_logs"))
        .and(body_string_contains("seller_logs"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let value = client(&server)
        .persist_log_to_meta(&json!({ "event": "create_cart" }))
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn shipping_sync_uploads_the_profile_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v20.0/cpi_77/file_update"))
        .and(header("authorization", "Bearer store-token"))
        .and(body_string_contains("SHIPPING_PROFILES"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "handle": "upload_1" })))
        .expect(1)
        .mount(&server)
        .await;

    let export_dir = tempfile::tempdir().unwrap();
    let base_url = server.uri();
    let dir = export_dir.path().to_string_lossy().into_owned();
    let app = TestApp::with_config(move |cfg| {
        cfg.graph_base_url = base_url;
        cfg.export_dir = dir;
    })
    .await;
    app.system_config
        .set(STORE_ID, paths::ACCESS_TOKEN, Some("store-token"))
        .await
        .unwrap();
    app.system_config
        .set(STORE_ID, paths::COMMERCE_PARTNER_INTEGRATION_ID, Some("cpi_77"))
        .await
        .unwrap();

    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/meta/shipping_sync",
            Some(json!({ "store_id": STORE_ID })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["profiles"], 3);
    assert_eq!(body["data"]["response"]["handle"], "upload_1");

    let file_path = body["data"]["file_path"].as_str().unwrap();
    let csv = std::fs::read_to_string(file_path).unwrap();
    assert!(csv.lines().count() >= 2);
    assert!(csv.contains("flatrate"));
}

#[tokio::test]
async fn failed_upload_is_reported_to_meta() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v20.0/cpi_err/file_update"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v20.0/commerce_seller_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let export_dir = tempfile::tempdir().unwrap();
    let base_url = server.uri();
    let dir = export_dir.path().to_string_lossy().into_owned();
    let app = TestApp::with_config(move |cfg| {
        cfg.graph_base_url = base_url;
        cfg.export_dir = dir;
    })
    .await;
    app.system_config
        .set(STORE_ID, paths::ACCESS_TOKEN, Some("store-token"))
        .await
        .unwrap();
    app.system_config
        .set(STORE_ID, paths::COMMERCE_PARTNER_INTEGRATION_ID, Some("cpi_err"))
        .await
        .unwrap();

    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/meta/shipping_sync",
            Some(json!({ "store_id": STORE_ID })),
        )
        .await;
    assert_eq!(response.status(), 502);

    // the seller log is forwarded from a spawned task; `expect(1)` is verified on drop
    for _ in 0..50 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests
            .iter()
            .any(|r| r.url.path() == "/v20.0/commerce_seller_logs")
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
