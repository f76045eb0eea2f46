//! Checkout surface called by Meta, mounted at `/api/v1/meta/:external_business_id`.

pub mod carts;
pub mod discounts;
pub mod orders;

use crate::{auth::meta_auth_middleware, health::meta_health_check, AppState};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BusinessPath {
    pub external_business_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CartPath {
    pub external_business_id: String,
    pub cart_id: String,
}

/// Every route here requires a valid API key and body signature.
pub fn meta_routes() -> Router<AppState> {
    Router::new()
        .route("/carts", post(carts::create_cart))
        .route("/carts/:cart_id", get(carts::get_cart))
        .route("/carts/:cart_id/items", post(carts::add_cart_items))
        .route(
            "/carts/:cart_id/items/:item_id",
            put(carts::update_cart_item).delete(carts::delete_cart_item),
        )
        .route(
            "/carts/:cart_id/coupons",
            put(carts::add_cart_coupon).delete(carts::delete_cart_coupon),
        )
        .route("/carts/:cart_id/totals", get(carts::cart_totals))
        .route(
            "/carts/:cart_id/shipping_options",
            get(carts::cart_shipping_options),
        )
        .route("/carts/:cart_id/customer", put(carts::set_cart_customer))
        .route(
            "/carts/:cart_id/shipping_method",
            put(carts::select_shipping_method),
        )
        .route("/orders", post(orders::create_order))
        .route("/orders/:facebook_order_id", get(orders::get_order))
        .route("/coupons", post(discounts::generate_coupon_code))
        .route("/newsletter", post(discounts::subscribe_to_newsletter))
        .route("/health_check", get(meta_health_check))
        .route_layer(middleware::from_fn(meta_auth_middleware))
}
