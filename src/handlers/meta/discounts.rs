use super::BusinessPath;
use crate::{
    errors::ApiError,
    handlers::common::{created_response, map_service_error},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct GenerateCouponRequest {
    pub rule_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    pub email: String,
}

pub async fn generate_coupon_code(
    State(state): State<AppState>,
    Path(path): Path<BusinessPath>,
    Json(payload): Json<GenerateCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = state
        .services
        .discounts
        .generate_coupon_code(&path.external_business_id, payload.rule_id)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(json!({ "coupon_code": code })))
}

pub async fn subscribe_to_newsletter(
    State(state): State<AppState>,
    Path(path): Path<BusinessPath>,
    Json(payload): Json<NewsletterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .discounts
        .subscribe_to_newsletter(&path.external_business_id, &payload.email)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(result))
}
