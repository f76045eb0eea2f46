pub mod admin;
pub mod common;
pub mod meta;

use crate::{
    auth::Authenticator,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        commerce::{CartService, CheckoutService, CheckoutSession, DiscountService},
        meta::{ConnectionService, MetaTelemetry, ShippingSyncer, TelemetrySink},
        system_config::SystemConfigService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub authenticator: Arc<Authenticator>,
    pub system_config: Arc<SystemConfigService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub discounts: Arc<DiscountService>,
    pub connection: Arc<ConnectionService>,
    pub shipping: Arc<ShippingSyncer>,
}

impl AppServices {
    /// Wires every service with the Meta telemetry sink.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: Arc<AppConfig>) -> Self {
        let system_config = Arc::new(SystemConfigService::new(db_pool.clone()));
        let telemetry: Arc<dyn TelemetrySink> =
            Arc::new(MetaTelemetry::new(system_config.clone(), config.clone()));
        Self::with_telemetry(db_pool, event_sender, config, system_config, telemetry)
    }

    pub fn with_telemetry(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        system_config: Arc<SystemConfigService>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let authenticator = Arc::new(Authenticator::new(system_config.clone(), config.clone()));
        let cart = Arc::new(CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
            system_config.clone(),
            telemetry.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.clone(),
            system_config.clone(),
            telemetry.clone(),
            Arc::new(CheckoutSession::new()),
        ));
        let discounts = Arc::new(DiscountService::new(
            db_pool.clone(),
            event_sender.clone(),
            system_config.clone(),
        ));
        let connection = Arc::new(ConnectionService::new(
            db_pool,
            system_config.clone(),
            event_sender.clone(),
        ));
        let shipping = Arc::new(ShippingSyncer::new(
            system_config.clone(),
            config,
            telemetry,
            event_sender,
        ));

        Self {
            authenticator,
            system_config,
            cart,
            checkout,
            discounts,
            connection,
            shipping,
        }
    }
}
