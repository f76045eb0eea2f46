/*!
 * # Authentication Module
 *
 * Guards the Meta checkout surface and the admin endpoints.
 *
 * - Meta requests carry an `X-API-Key` header matched against the store's default
 *   scope key, plus an HMAC-SHA256 body signature over `"{timestamp}.{body}"`.
 * - Admin requests carry `Authorization: Bearer <admin_token>`.
 *
 * All secret comparisons are constant time.
 */

use crate::{
    config::AppConfig,
    entities::system_config::DEFAULT_SCOPE,
    errors::ServiceError,
    services::system_config::{paths, SystemConfigService},
};
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const TIMESTAMP_HEADER: &str = "x-meta-timestamp";
pub const SIGNATURE_HEADER: &str = "x-meta-signature";
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Largest request body buffered for signature checks
pub const MAX_SIGNED_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Missing request signature")]
    MissingSignature,

    #[error("Invalid request signature")]
    InvalidSignature,

    #[error("Request signature has expired")]
    SignatureExpired,

    #[error("Missing admin token")]
    MissingAdminToken,

    #[error("Invalid admin token")]
    InvalidAdminToken,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, &str) = match &self {
            Self::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_API_KEY",
                "No API key provided",
            ),
            Self::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_API_KEY",
                "Invalid API key",
            ),
            Self::MissingSignature => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_SIGNATURE",
                "Request signature headers are missing",
            ),
            Self::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_SIGNATURE",
                "Invalid request signature",
            ),
            Self::SignatureExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_SIGNATURE_EXPIRED",
                "Request signature has expired",
            ),
            Self::MissingAdminToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_TOKEN",
                "No admin token provided",
            ),
            Self::InvalidAdminToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid admin token",
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Authentication is unavailable",
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<ServiceError> for AuthError {
    fn from(err: ServiceError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Request authentication for Meta and admin callers.
#[derive(Clone)]
pub struct Authenticator {
    system_config: Arc<SystemConfigService>,
    config: Arc<AppConfig>,
}

impl Authenticator {
    pub fn new(system_config: Arc<SystemConfigService>, config: Arc<AppConfig>) -> Self {
        Self {
            system_config,
            config,
        }
    }

    /// The persisted default scope key wins over the configured fallback.
    async fn expected_api_key(&self) -> Result<Option<String>, AuthError> {
        let stored = self.system_config.get(DEFAULT_SCOPE, paths::API_KEY).await?;
        Ok(stored.or_else(|| self.config.api_key.clone().filter(|k| !k.is_empty())))
    }

    pub async fn authenticate_request(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingApiKey)?;

        let expected = self.expected_api_key().await?.ok_or_else(|| {
            warn!("Rejecting Meta request: no API key is configured");
            AuthError::InvalidApiKey
        })?;

        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }

    pub fn validate_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), AuthError> {
        let timestamp = header_str(headers, TIMESTAMP_HEADER).ok_or(AuthError::MissingSignature)?;
        let signature = header_str(headers, SIGNATURE_HEADER).ok_or(AuthError::MissingSignature)?;

        let secret = self
            .config
            .signature_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::InvalidSignature)?;

        let sent_at: i64 = timestamp.parse().map_err(|_| AuthError::InvalidSignature)?;
        let skew = (Utc::now().timestamp() - sent_at).unsigned_abs();
        if skew > self.config.signature_tolerance_secs {
            debug!("Signature timestamp is {}s away from now", skew);
            return Err(AuthError::SignatureExpired);
        }

        let provided = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
        let expected = sign_payload(secret, timestamp, body)?;
        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    pub fn validate_admin_token(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingAdminToken)?;

        let expected = self
            .config
            .admin_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAdminToken)?;

        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidAdminToken)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}

/// Fresh 64 character hex API key.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn authenticator(request: &Request) -> Result<Arc<Authenticator>, AuthError> {
    request
        .extensions()
        .get::<Arc<Authenticator>>()
        .cloned()
        .ok_or_else(|| AuthError::Internal("Authenticator not available".to_string()))
}

/// Checks the API key, then the body signature, before any checkout work runs.
pub async fn meta_auth_middleware(request: Request, next: Next) -> Response {
    let auth = match authenticator(&request) {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };

    let (parts, body) = request.into_parts();
    if let Err(e) = auth.authenticate_request(&parts.headers).await {
        warn!(uri = %parts.uri, "Meta request rejected: {}", e);
        return e.into_response();
    }

    let bytes = match to_bytes(body, MAX_SIGNED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return ServiceError::InvalidInput("Request body is too large".to_string())
                .into_response()
        }
    };
    if let Err(e) = auth.validate_signature(&parts.headers, &bytes) {
        warn!(uri = %parts.uri, "Meta request rejected: {}", e);
        return e.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

pub async fn admin_auth_middleware(request: Request, next: Next) -> Response {
    let auth = match authenticator(&request) {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = auth.validate_admin_token(request.headers()) {
        warn!(uri = %request.uri(), "Admin request rejected: {}", e);
        return e.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    async fn authenticator(api_key: Option<&str>) -> Authenticator {
        let db = Arc::new(crate::db::connect_in_memory().await.unwrap());
        let mut config =
            AppConfig::new("sqlite::memory:".into(), "127.0.0.1".into(), 0, "test".into());
        config.api_key = api_key.map(String::from);
        config.signature_secret = Some("shh-its-a-secret".into());
        config.admin_token = Some("admin-token-123".into());
        Authenticator::new(Arc::new(SystemConfigService::new(db)), Arc::new(config))
    }

    fn signed_headers(secret: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let ts = ts.to_string();
        let sig = sign_payload(secret, &ts, body).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&ts).unwrap());
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&format!("{}{}", SIGNATURE_PREFIX, sig)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn api_key_is_required_and_compared() {
        let auth = authenticator(Some("key-1")).await;
        assert_matches!(
            auth.authenticate_request(&HeaderMap::new()).await,
            Err(AuthError::MissingApiKey)
        );

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("key-2"));
        assert_matches!(
            auth.authenticate_request(&headers).await,
            Err(AuthError::InvalidApiKey)
        );

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("key-1"));
        assert!(auth.authenticate_request(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn stored_key_overrides_configured_key() {
        let auth = authenticator(Some("fallback")).await;
        auth.system_config
            .set(DEFAULT_SCOPE, paths::API_KEY, Some("stored"))
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("fallback"));
        assert_matches!(
            auth.authenticate_request(&headers).await,
            Err(AuthError::InvalidApiKey)
        );
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("stored"));
        assert!(auth.authenticate_request(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn no_configured_key_rejects_everything() {
        let auth = authenticator(None).await;
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("anything"));
        assert_matches!(
            auth.authenticate_request(&headers).await,
            Err(AuthError::InvalidApiKey)
        );
    }

    #[tokio::test]
    async fn signature_checks_body_and_time() {
        let auth = authenticator(Some("k")).await;
        let body = br#"{"cart_id":"abc"}"#;
        let now = Utc::now().timestamp();

        let headers = signed_headers("shh-its-a-secret", now, body);
        assert!(auth.validate_signature(&headers, body).is_ok());
        assert_matches!(
            auth.validate_signature(&headers, b"{}"),
            Err(AuthError::InvalidSignature)
        );

        let wrong_secret = signed_headers("other", now, body);
        assert_matches!(
            auth.validate_signature(&wrong_secret, body),
            Err(AuthError::InvalidSignature)
        );

        let stale = signed_headers("shh-its-a-secret", now - 3600, body);
        assert_matches!(
            auth.validate_signature(&stale, body),
            Err(AuthError::SignatureExpired)
        );

        assert_matches!(
            auth.validate_signature(&HeaderMap::new(), body),
            Err(AuthError::MissingSignature)
        );
    }

    #[tokio::test]
    async fn admin_token_uses_bearer_scheme() {
        let auth = authenticator(None).await;
        let mut headers = HeaderMap::new();
        assert_matches!(
            auth.validate_admin_token(&headers),
            Err(AuthError::MissingAdminToken)
        );
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert_matches!(
            auth.validate_admin_token(&headers),
            Err(AuthError::InvalidAdminToken)
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer admin-token-123"),
        );
        assert!(auth.validate_admin_token(&headers).is_ok());
    }

    #[test]
    fn generated_keys_are_distinct_hex() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_requires_equal_length() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc", b"abd"));
    }
}
