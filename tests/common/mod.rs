#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use meta_commerce_bridge::{
    app_router,
    auth::{sign_payload, API_KEY_HEADER, SIGNATURE_HEADER, SIGNATURE_PREFIX, TIMESTAMP_HEADER},
    config::AppConfig,
    db,
    entities::commerce::{
        product,
        sales_rule::{self, CouponFormat, DiscountType},
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::system_config::{paths, SystemConfigService},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const EXTERNAL_BUSINESS_ID: &str = "biz_1";
pub const STORE_ID: i32 = 1;
pub const API_KEY: &str = "test-api-key";
pub const SIGNATURE_SECRET: &str = "test-signature-secret";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Helper harness for spinning up the bridge backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub system_config: Arc<SystemConfigService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Store 1 connected as `biz_1`, 10% default tax and one product `SKU1` at 12.50.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.api_key = Some(API_KEY.to_string());
        cfg.signature_secret = Some(SIGNATURE_SECRET.to_string());
        cfg.admin_token = Some(ADMIN_TOKEN.to_string());
        cfg.default_currency = "USD".to_string();
        customize(&mut cfg);
        let cfg = Arc::new(cfg);

        let pool = db::connect_in_memory()
            .await
            .expect("failed to create test database");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), cfg.clone());
        let system_config = services.system_config.clone();

        system_config
            .set(STORE_ID, paths::EXTERNAL_BUSINESS_ID, Some(EXTERNAL_BUSINESS_ID))
            .await
            .expect("seed external business id");
        system_config
            .set(0, paths::TAX_DEFAULT_RATE, Some("10"))
            .await
            .expect("seed tax rate");

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let app = Self {
            router: app_router(state.clone()),
            state,
            system_config,
            _event_task: event_task,
        };
        app.seed_product("SKU1", "Widget", Decimal::new(1250, 2)).await;
        app
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub async fn seed_product(&self, sku: &str, name: &str, price: Decimal) {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(name.to_string()),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed product");
    }

    /// Percent-off rule with 12 character alphanumeric coupons. Returns the rule id.
    pub async fn seed_percent_rule(&self, percent: Decimal, uses_per_coupon: i32) -> i32 {
        let rule = sales_rule::ActiveModel {
            store_id: Set(None),
            name: Set(format!("{}% off", percent)),
            is_active: Set(true),
            discount_type: Set(DiscountType::ByPercent),
            discount_amount: Set(percent),
            coupon_prefix: Set(String::new()),
            coupon_suffix: Set(String::new()),
            coupon_length: Set(12),
            coupon_format: Set(CouponFormat::Alphanumeric),
            coupon_dash_every: Set(0),
            uses_per_coupon: Set(uses_per_coupon),
            from_date: Set(None),
            to_date: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed sales rule");
        rule.id
    }

    /// Path under the business namespace, e.g. `meta_path("/carts")`.
    pub fn meta_path(&self, suffix: &str) -> String {
        format!("/api/v1/meta/{}{}", EXTERNAL_BUSINESS_ID, suffix)
    }

    /// Sends a request carrying the API key and a fresh body signature.
    pub async fn meta_request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let payload = body.map(|b| b.to_string()).unwrap_or_default();
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_payload(SIGNATURE_SECRET, &timestamp, payload.as_bytes())
            .expect("signature");

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, API_KEY)
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, format!("{}{}", SIGNATURE_PREFIX, signature))
            .body(Body::from(payload))
            .expect("request");
        self.send(request).await
    }

    pub async fn admin_request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::from(body.map(|b| b.to_string()).unwrap_or_default()))
            .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Creates a cart and adds `qty` of SKU1. Returns the masked cart id.
    pub async fn cart_with_sku1(&self, qty: i32) -> String {
        let response = self
            .meta_request(Method::POST, &self.meta_path("/carts"), None)
            .await;
        assert_eq!(response.status(), 201);
        let cart_id = response_json(response).await["cart_id"]
            .as_str()
            .expect("cart id")
            .to_string();

        let response = self
            .meta_request(
                Method::POST,
                &self.meta_path(&format!("/carts/{}/items", cart_id)),
                Some(serde_json::json!({ "items": [{ "sku": "SKU1", "qty": qty }] })),
            )
            .await;
        assert_eq!(response.status(), 200);
        cart_id
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decimal fields serialize as strings; SQLite may hand back float noise.
pub fn money(value: &Value) -> f64 {
    let raw = match value {
        Value::String(s) => s.parse::<f64>().expect("decimal string"),
        Value::Number(n) => n.as_f64().expect("number"),
        other => panic!("not a money value: {other}"),
    };
    (raw * 100.0).round() / 100.0
}
