use super::{BusinessPath, CartPath};
use crate::{
    errors::ApiError,
    handlers::common::{created_response, map_service_error, success_response, validate_input},
    services::commerce::{CartCustomerInput, CartItemInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct CartItemPath {
    pub external_business_id: String,
    pub cart_id: String,
    pub item_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemsRequest {
    #[validate(length(min = 1))]
    pub items: Vec<CartItemInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 1))]
    pub qty: i32,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1))]
    pub coupon_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ShippingMethodRequest {
    #[validate(length(min = 1))]
    pub method_code: String,
}

/// Create a guest cart, answering with its masked id
pub async fn create_cart(
    State(state): State<AppState>,
    Path(path): Path<BusinessPath>,
) -> Result<impl IntoResponse, ApiError> {
    let cart_id = state
        .services
        .cart
        .create_cart(&path.external_business_id)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(json!({ "cart_id": cart_id })))
}

pub async fn get_cart(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(&path.external_business_id, &path.cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

pub async fn add_cart_items(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
    Json(payload): Json<AddItemsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_cart_items(&path.external_business_id, &path.cart_id, payload.items)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    Path(path): Path<CartItemPath>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .update_cart_item(
            &path.external_business_id,
            &path.cart_id,
            path.item_id,
            payload.qty,
            payload.tax_amount,
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

pub async fn delete_cart_item(
    State(state): State<AppState>,
    Path(path): Path<CartItemPath>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .services
        .cart
        .delete_cart_item(&path.external_business_id, &path.cart_id, path.item_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(removed))
}

pub async fn add_cart_coupon(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
    Json(payload): Json<CouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_cart_coupon(
            &path.external_business_id,
            &path.cart_id,
            &payload.coupon_code,
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

pub async fn delete_cart_coupon(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .services
        .cart
        .delete_cart_coupon(&path.external_business_id, &path.cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(removed))
}

pub async fn cart_totals(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
) -> Result<impl IntoResponse, ApiError> {
    let totals = state
        .services
        .cart
        .cart_totals(&path.external_business_id, &path.cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(totals))
}

pub async fn cart_shipping_options(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
) -> Result<impl IntoResponse, ApiError> {
    let options = state
        .services
        .cart
        .cart_shipping_options(&path.external_business_id, &path.cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(options))
}

pub async fn select_shipping_method(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
    Json(payload): Json<ShippingMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .select_shipping_method(
            &path.external_business_id,
            &path.cart_id,
            &payload.method_code,
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

pub async fn set_cart_customer(
    State(state): State<AppState>,
    Path(path): Path<CartPath>,
    Json(payload): Json<CartCustomerInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .set_cart_customer(&path.external_business_id, &path.cart_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}
