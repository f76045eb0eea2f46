//! Admin endpoints for connecting a store to Meta.
//!
//! Every answer is an [`ApiResponse`]. Failures carry a generic message; the real
//! error only goes to the log.

use crate::{
    auth::admin_auth_middleware,
    errors::ServiceError,
    services::meta::{InstalledFeatureInput, MetaSettingsUpdate},
    ApiResponse, AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Query, State,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Deserialize)]
pub struct StoreQuery {
    pub store_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct SaveSettingsRequest {
    pub store_id: i32,
    #[serde(flatten)]
    pub settings: MetaSettingsUpdate,
}

#[derive(Debug, Deserialize)]
pub struct InstalledFeaturesRequest {
    pub store_id: i32,
    #[serde(default)]
    pub features: Vec<InstalledFeatureInput>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).post(save_settings))
        .route("/delete_connection", post(delete_connection))
        .route(
            "/installed_features",
            get(list_installed_features).post(replace_installed_features),
        )
        .route("/shipping_sync", post(sync_shipping))
        .route("/api_key", post(rotate_api_key))
        .route_layer(middleware::from_fn(admin_auth_middleware))
}

fn respond<T: Serialize>(action: &str, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(data) => Json(ApiResponse::success(data)).into_response(),
        Err(err) => {
            error!(action, "Admin request failed: {}", err);
            (
                err.status_code(),
                Json(ApiResponse::<()>::error(GENERIC_FAILURE.to_string())),
            )
                .into_response()
        }
    }
}

/// Malformed bodies and query strings get the same envelope as service failures.
fn accept<T, R: std::fmt::Display>(action: &str, extracted: Result<T, R>) -> Result<T, Response> {
    extracted.map_err(|rejection| {
        respond::<()>(action, Err(ServiceError::InvalidInput(rejection.to_string())))
    })
}

pub async fn save_settings(
    State(state): State<AppState>,
    payload: Result<Json<SaveSettingsRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(payload) = accept("save_settings", payload)?;
    let result = state
        .services
        .connection
        .save_settings(payload.store_id, payload.settings)
        .await;
    Ok(respond("save_settings", result))
}

pub async fn get_settings(
    State(state): State<AppState>,
    query: Result<Query<StoreQuery>, QueryRejection>,
) -> Result<Response, Response> {
    let Query(query) = accept("get_settings", query)?;
    let result = state.services.connection.settings(query.store_id).await;
    Ok(respond("get_settings", result))
}

pub async fn delete_connection(
    State(state): State<AppState>,
    payload: Result<Json<StoreQuery>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(payload) = accept("delete_connection", payload)?;
    let result = state
        .services
        .connection
        .delete_connection(payload.store_id)
        .await
        .map(|removed| json!({ "removed_settings": removed }));
    Ok(respond("delete_connection", result))
}

pub async fn replace_installed_features(
    State(state): State<AppState>,
    payload: Result<Json<InstalledFeaturesRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(payload) = accept("replace_installed_features", payload)?;
    let result = state
        .services
        .connection
        .replace_installed_features(payload.store_id, payload.features)
        .await;
    Ok(respond("replace_installed_features", result))
}

pub async fn list_installed_features(
    State(state): State<AppState>,
    query: Result<Query<StoreQuery>, QueryRejection>,
) -> Result<Response, Response> {
    let Query(query) = accept("list_installed_features", query)?;
    let result = state
        .services
        .connection
        .installed_features(query.store_id)
        .await;
    Ok(respond("list_installed_features", result))
}

pub async fn sync_shipping(
    State(state): State<AppState>,
    payload: Result<Json<StoreQuery>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(payload) = accept("sync_shipping", payload)?;
    let result = state
        .services
        .shipping
        .sync_shipping_profiles(payload.store_id)
        .await;
    Ok(respond("sync_shipping", result))
}

pub async fn rotate_api_key(State(state): State<AppState>) -> Response {
    let result = state
        .services
        .connection
        .rotate_api_key()
        .await
        .map(|api_key| json!({ "api_key": api_key }));
    respond("rotate_api_key", result)
}
