use super::BusinessPath;
use crate::{
    errors::ApiError,
    handlers::common::{created_response, map_service_error, success_response},
    services::commerce::CreateOrderInput,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub cart_id: String,
    pub facebook_order_id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub channel: String,
    #[serde(default)]
    pub buyer_remarketing_status: bool,
    #[serde(default)]
    pub create_invoice: bool,
}

#[derive(Debug, Deserialize)]
pub struct OrderPath {
    pub external_business_id: String,
    pub facebook_order_id: String,
}

/// Convert a Meta checkout into a store order
pub async fn create_order(
    State(state): State<AppState>,
    Path(path): Path<BusinessPath>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = CreateOrderInput {
        external_business_id: path.external_business_id,
        cart_id: payload.cart_id,
        facebook_order_id: payload.facebook_order_id,
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        channel: payload.channel,
        buyer_remarketing_status: payload.buyer_remarketing_status,
        create_invoice: payload.create_invoice,
    };

    let order = state
        .services
        .checkout
        .create_order(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(path): Path<OrderPath>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .checkout
        .get_order_by_facebook_id(&path.external_business_id, &path.facebook_order_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
