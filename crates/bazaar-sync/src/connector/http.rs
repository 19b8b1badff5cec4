//! # Authenticated HTTP Client
//!
//! Shared request plumbing for the marketplace connectors.
//!
//! ## Request Flow
//! ```text
//!   connector ──► ApiClient::get / post
//!                   │
//!                   ├─ TokenManager::get_token()   (login on miss)
//!                   ├─ bearer auth + per-request timeout
//!                   ▼
//!                 response
//!                   ├─ rejection status ──► invalidate() ──► AuthRejected
//!                   ├─ other non-2xx    ──► HttpStatus { status, body }
//!                   └─ 2xx              ──► serde_json decode
//! ```
//!
//! A rejected call is not retried in place: the token is dropped, the
//! operation is skipped, and the next call performs exactly one fresh login.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use bazaar_core::Platform;

use crate::auth::{Authenticator, Grant, TokenManager};
use crate::config::{PlatformConfig, SyncSettings};
use crate::error::{SyncError, SyncResult};
use crate::signing;

/// Builds the reqwest client every connector uses.
pub fn build_http(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Joins a base URL and a relative path without dropping base path segments.
pub(crate) fn join_url(base: &str, path: &str) -> SyncResult<String> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url::Url::parse(&joined)?;
    Ok(joined)
}

/// Percent-encodes one path segment, so an id holding `/`, `?` or `#` stays
/// inside its segment.
pub(crate) fn path_segment(raw: &str) -> SyncResult<String> {
    let mut url = url::Url::parse("http://segment.invalid/")?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Internal("cannot encode path segment".into()))?
        .pop_if_empty()
        .push(raw);
    Ok(url.path().trim_start_matches('/').to_string())
}

// =============================================================================
// Signed Login
// =============================================================================

/// The `{sellerId, timestamp, signature}` login exchange all three
/// marketplaces use; only the path and the response shape differ.
pub struct SignedLogin {
    platform: Platform,
    http: reqwest::Client,
    url: String,
    seller_id: String,
    secret_key: String,
    parse: fn(Value) -> SyncResult<Grant>,
}

impl SignedLogin {
    pub fn new(
        platform: Platform,
        http: reqwest::Client,
        config: &PlatformConfig,
        path: &str,
        parse: fn(Value) -> SyncResult<Grant>,
    ) -> SyncResult<Self> {
        Ok(SignedLogin {
            platform,
            http,
            url: join_url(&config.base_url, path)?,
            seller_id: config.seller_id.clone(),
            secret_key: config.secret_key.clone(),
            parse,
        })
    }

    fn failed(&self, reason: impl Into<String>) -> SyncError {
        SyncError::LoginFailed {
            platform: self.platform,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Authenticator for SignedLogin {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn login(&self) -> SyncResult<Grant> {
        let timestamp = Utc::now().timestamp();
        let body = serde_json::json!({
            "sellerId": self.seller_id,
            "timestamp": timestamp,
            "signature": signing::sign(self.platform, &self.secret_key, timestamp)?,
        });

        debug!(platform = %self.platform, "Logging in");
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.failed(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.failed(format!("unreadable login response: {}", e)))?;
        (self.parse)(payload).map_err(|e| match e {
            login @ SyncError::LoginFailed { .. } => login,
            other => self.failed(other.to_string()),
        })
    }
}

// =============================================================================
// API Client
// =============================================================================

/// Authenticated JSON client for one marketplace.
pub struct ApiClient {
    platform: Platform,
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
    /// HTTP statuses that mean "token refused".
    rejection_statuses: &'static [u16],
}

impl ApiClient {
    /// Creates the client together with its token manager.
    pub fn new(
        platform: Platform,
        config: &PlatformConfig,
        settings: &SyncSettings,
        login_path: &str,
        parse_grant: fn(Value) -> SyncResult<Grant>,
        rejection_statuses: &'static [u16],
    ) -> SyncResult<Self> {
        let http = build_http(settings.request_timeout())?;
        let login = SignedLogin::new(platform, http.clone(), config, login_path, parse_grant)?;
        let tokens = Arc::new(TokenManager::new(Box::new(login), settings.token_lifetime()));
        join_url(&config.base_url, "")?;

        Ok(ApiClient {
            platform,
            http,
            base_url: config.base_url.clone(),
            tokens,
            rejection_statuses,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SyncResult<T> {
        let url = join_url(&self.base_url, path)?;
        self.execute(self.http.get(url).query(query), path).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = join_url(&self.base_url, path)?;
        self.execute(self.http.post(url).json(body), path).await
    }

    /// Drops the token after an application-level rejection and returns the
    /// error the caller should surface.
    pub async fn reject(&self) -> SyncError {
        self.tokens.invalidate().await;
        SyncError::AuthRejected {
            platform: self.platform,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> SyncResult<T> {
        let token = self.tokens.get_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if self.rejection_statuses.contains(&status.as_u16()) {
            warn!(platform = %self.platform, path, status = status.as_u16(), "Token rejected");
            return Err(self.reject().await);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
