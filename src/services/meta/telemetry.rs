use crate::{
    config::AppConfig,
    errors::ServiceError,
    services::{meta::graph_api::GraphApiClient, system_config::SystemConfigService},
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Context attached to a logged failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExceptionContext {
    pub store_id: Option<i32>,
    pub event: String,
    pub event_type: String,
    pub extra: Map<String, Value>,
}

impl ExceptionContext {
    pub fn new(event: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            store_id: None,
            event: event.into(),
            event_type: event_type.into(),
            extra: Map::new(),
        }
    }

    pub fn with_store(mut self, store_id: i32) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Body posted to Meta's seller log endpoint.
    pub fn to_seller_log(&self, error: &ServiceError) -> Value {
        json!({
            "event": self.event,
            "event_type": self.event_type,
            "exception_message": error.to_string(),
            "exception_code": error.status_code().as_u16(),
            "store_id": self.store_id,
            "extra_data": self.extra,
        })
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn log_exception(&self, error: &ServiceError, context: ExceptionContext);
}

/// Logs failures locally and forwards them to Meta when the store is connected.
#[derive(Clone)]
pub struct MetaTelemetry {
    system_config: Arc<SystemConfigService>,
    config: Arc<AppConfig>,
}

impl MetaTelemetry {
    pub fn new(system_config: Arc<SystemConfigService>, config: Arc<AppConfig>) -> Self {
        Self {
            system_config,
            config,
        }
    }
}

#[async_trait]
impl TelemetrySink for MetaTelemetry {
    async fn log_exception(&self, err: &ServiceError, context: ExceptionContext) {
        error!(
            store_id = ?context.store_id,
            event = %context.event,
            event_type = %context.event_type,
            extra = %serde_json::Value::Object(context.extra.clone()),
            "{}",
            err
        );

        let Some(store_id) = context.store_id else {
            return;
        };

        let client =
            match GraphApiClient::for_store(&self.system_config, &self.config, store_id).await {
                Ok(client) => client,
                Err(e) => {
                    debug!("Skipping Meta seller log for store {}: {}", store_id, e);
                    return;
                }
            };

        let payload = context.to_seller_log(err);
        tokio::spawn(async move {
            if let Err(e) = client.persist_log_to_meta(&payload).await {
                warn!("Failed to persist log to Meta: {}", e);
            }
        });
    }
}
