//! Client for Meta's Graph API.
//!
//! Every call is versioned (`{base}/{version}/{endpoint}`), authenticated with the
//! store's bearer access token and answered with decoded JSON. GET parameters travel
//! in the query string, POST and DELETE parameters are form encoded.

use crate::{
    config::AppConfig,
    errors::ServiceError,
    services::system_config::{paths, SystemConfigService},
};
use metrics::counter;
use reqwest::{
    multipart::{Form, Part},
    Client, Method, Response,
};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while talking to the Graph API.
#[derive(Debug, Error)]
pub enum GraphApiError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer from Meta.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has no access token.
    #[error("Graph API is not configured: {0}")]
    NotConfigured(String),
}

impl From<GraphApiError> for ServiceError {
    fn from(err: GraphApiError) -> Self {
        match err {
            GraphApiError::NotConfigured(msg) => ServiceError::InvalidOperation(msg),
            other => ServiceError::ExternalApiError(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct GraphApiClient {
    client: Client,
    base_url: String,
    api_version: String,
    access_token: String,
    debug: bool,
}

impl GraphApiClient {
    /// Build a client with a fresh reqwest client bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
        debug: bool,
    ) -> Result<Self, GraphApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(
            client,
            base_url,
            api_version,
            access_token,
            debug,
        ))
    }

    /// Build a client from an existing reqwest client.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        access_token: impl Into<String>,
        debug: bool,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            access_token: access_token.into(),
            debug,
        }
    }

    /// Client for a store, using its persisted access token and debug flag.
    pub async fn for_store(
        config: &SystemConfigService,
        app: &AppConfig,
        store_id: i32,
    ) -> Result<Self, ServiceError> {
        let access_token = config
            .get(store_id, paths::ACCESS_TOKEN)
            .await?
            .ok_or_else(|| {
                GraphApiError::NotConfigured(format!("store {} has no access token", store_id))
            })?;
        let debug = app.graph_debug || config.get_bool(store_id, paths::DEBUG_MODE).await?;

        Ok(Self::new(
            app.graph_base_url.clone(),
            app.graph_api_version.clone(),
            access_token,
            Duration::from_secs(app.graph_timeout_secs),
            debug,
        )?)
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.api_version,
            endpoint.trim_start_matches('/')
        )
    }

    /// Single versioned call. No retry.
    #[instrument(skip(self, params))]
    pub async fn graph_request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, GraphApiError> {
        let url = self.endpoint_url(endpoint);
        if self.debug {
            debug!("Graph API request {} {} params={:?}", method, url, params);
        }

        let request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token);
        let request = if method == Method::GET {
            request.query(params)
        } else {
            request.form(params)
        };

        let response = request.send().await.map_err(|e| {
            counter!("meta_bridge_graph.failures", 1);
            GraphApiError::from(e)
        })?;
        self.handle_response(response).await
    }

    async fn handle_response(&self, response: Response) -> Result<Value, GraphApiError> {
        let status = response.status();
        let body = response.text().await?;
        if self.debug {
            debug!("Graph API response status={} body={}", status, body);
        }

        if !status.is_success() {
            counter!("meta_bridge_graph.failures", 1);
            return Err(GraphApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| GraphApiError::Parse(format!("Failed to parse response: {}", e)))
    }

    /// Business extension installs for a Meta business.
    pub async fn get_fbe_installs(&self, external_business_id: &str) -> Result<Value, GraphApiError> {
        self.graph_request(
            Method::GET,
            "fbe_business/fbe_installs",
            &[("fbe_external_business_id", external_business_id)],
        )
        .await
    }

    pub async fn get_catalog_info(&self, catalog_id: &str) -> Result<Value, GraphApiError> {
        self.graph_request(Method::GET, catalog_id, &[("fields", "name,vertical")])
            .await
    }

    pub async fn send_pixel_events(
        &self,
        pixel_id: &str,
        events: &[Value],
    ) -> Result<Value, GraphApiError> {
        let data = serde_json::to_string(events)
            .map_err(|e| GraphApiError::Parse(format!("Failed to encode events: {}", e)))?;
        self.graph_request(
            Method::POST,
            &format!("{}/events", pixel_id),
            &[("data", data.as_str())],
        )
        .await
    }

    /// Multipart upload of a feed file to a commerce partner integration.
    #[instrument(skip(self))]
    pub async fn upload_file(
        &self,
        commerce_partner_integration_id: &str,
        path: &Path,
        feed_type: &str,
        update_type: &str,
    ) -> Result<Value, GraphApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let form = Form::new()
            .part("file", part)
            .text("feed_type", feed_type.to_string())
            .text("update_type", update_type.to_string());

        let url = self.endpoint_url(&format!("{}/file_update", commerce_partner_integration_id));
        if self.debug {
            debug!(
                "Graph API upload {} feed_type={} update_type={}",
                url, feed_type, update_type
            );
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                counter!("meta_bridge_graph.failures", 1);
                GraphApiError::from(e)
            })?;
        self.handle_response(response).await
    }

    /// Forwards a structured log record to Meta's seller log endpoint.
    pub async fn persist_log_to_meta(&self, context: &Value) -> Result<Value, GraphApiError> {
        let seller_logs = serde_json::to_string(context)
            .map_err(|e| GraphApiError::Parse(format!("Failed to encode log: {}", e)))?;
        self.graph_request(
            Method::POST,
            "commerce_seller_logs",
            &[("seller_logs", seller_logs.as_str())],
        )
        .await
    }
}

/// `error.message` from a Graph error body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
