//! # Token Manager
//!
//! Per-platform access token cache. Every connector owns exactly one
//! [`TokenManager`]; nothing about tokens is global.
//!
//! ## Token Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Token State Machine                              │
//! │                                                                         │
//! │   UNAUTHENTICATED ──get_token()──► login exchange ──ok──► AUTHENTICATED │
//! │         ▲                               │                      │        │
//! │         │                               └─err─► LoginFailed    │        │
//! │         │                                       (skip cycle)   │        │
//! │         │                                                      │        │
//! │         ├──────────── expiry instant passed (EXPIRED) ◄────────┤        │
//! │         │                                                      │        │
//! │         └──────────── invalidate() after a 401 (INVALIDATED) ◄─┘        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifetime
//! Marketplaces do not always say how long a token lives. When they do, the
//! cached expiry is that lifetime minus [`EXPIRY_MARGIN_SECS`]; when they do
//! not, the configured conservative lifetime applies. Expiry is measured on
//! the tokio clock, so paused-time tests can fast-forward through it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use bazaar_core::Platform;

use crate::error::{SyncError, SyncResult};

/// Subtracted from a platform-reported lifetime before caching.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

/// Outcome of a successful login exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub access_token: String,
    /// Lifetime reported by the platform, if any.
    pub expires_in: Option<Duration>,
}

/// A platform's login exchange.
///
/// Implementations sign `{sellerId, timestamp}` with the platform's rule and
/// trade it for an access token. They do no caching of their own.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn platform(&self) -> Platform;

    async fn login(&self) -> SyncResult<Grant>;
}

/// Token information cached after authentication.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub expires_at: Instant,
}

impl TokenInfo {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

/// Owned, per-platform token cache.
pub struct TokenManager {
    authenticator: Box<dyn Authenticator>,
    default_lifetime: Duration,
    token: RwLock<Option<TokenInfo>>,
    logins: AtomicU64,
}

impl TokenManager {
    pub fn new(authenticator: Box<dyn Authenticator>, default_lifetime: Duration) -> Self {
        TokenManager {
            authenticator,
            default_lifetime,
            token: RwLock::new(None),
            logins: AtomicU64::new(0),
        }
    }

    pub fn platform(&self) -> Platform {
        self.authenticator.platform()
    }

    /// Returns a valid access token, logging in when none is cached.
    ///
    /// ## Flow
    /// 1. Read lock: return the cached token if it has not expired
    /// 2. Write lock: check again, another task may have logged in meanwhile
    /// 3. Run the login exchange and cache the result
    ///
    /// Any failure of the exchange surfaces as [`SyncError::LoginFailed`].
    pub async fn get_token(&self) -> SyncResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if !token.is_expired() {
                    debug!(
                        platform = %self.platform(),
                        remaining_secs = token.remaining_secs(),
                        "Using cached token"
                    );
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
            debug!(platform = %self.platform(), "Cached token expired");
        }

        let grant = self.authenticator.login().await.map_err(|e| match e {
            login @ SyncError::LoginFailed { .. } => login,
            other => SyncError::LoginFailed {
                platform: self.platform(),
                reason: other.to_string(),
            },
        })?;

        let lifetime = self.lifetime_of(&grant);
        let token = TokenInfo {
            access_token: grant.access_token,
            expires_at: Instant::now() + lifetime,
        };
        let count = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            platform = %self.platform(),
            expires_in_secs = lifetime.as_secs(),
            logins = count,
            "Authenticated with platform"
        );

        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token; the next [`get_token`](Self::get_token) logs in.
    pub async fn invalidate(&self) {
        let mut guard = self.token.write().await;
        if guard.take().is_some() {
            warn!(platform = %self.platform(), "Access token invalidated");
        }
    }

    /// Whether a non-expired token is cached.
    pub async fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| !t.is_expired())
            .unwrap_or(false)
    }

    /// Number of successful login exchanges so far.
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }

    fn lifetime_of(&self, grant: &Grant) -> Duration {
        match grant.expires_in {
            Some(reported) => reported.saturating_sub(Duration::from_secs(EXPIRY_MARGIN_SECS)),
            None => self.default_lifetime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct FakeLogin {
        expires_in: Option<Duration>,
        fail: Arc<AtomicBool>,
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Authenticator for FakeLogin {
        fn platform(&self) -> Platform {
            Platform::Uzum
        }

        async fn login(&self) -> SyncResult<Grant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::HttpStatus {
                    status: 403,
                    body: "bad signature".into(),
                });
            }
            Ok(Grant {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    fn manager(expires_in: Option<Duration>) -> (TokenManager, Arc<AtomicBool>, Arc<AtomicU64>) {
        let fail = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU64::new(0));
        let login = FakeLogin {
            expires_in,
            fail: fail.clone(),
            calls: calls.clone(),
        };
        (
            TokenManager::new(Box::new(login), Duration::from_secs(1800)),
            fail,
            calls,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_is_cached_until_default_lifetime() {
        let (tokens, _, calls) = manager(None);

        assert_eq!(tokens.get_token().await.unwrap(), "token-1");
        assert_eq!(tokens.get_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1799)).await;
        assert_eq!(tokens.get_token().await.unwrap(), "token-1");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
        assert_eq!(tokens.login_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_lifetime_keeps_margin() {
        let (tokens, _, _) = manager(Some(Duration::from_secs(600)));

        tokens.get_token().await.unwrap();
        tokio::time::advance(Duration::from_secs(539)).await;
        assert!(tokens.is_authenticated().await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tokens.is_authenticated().await);
        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_one_relogin() {
        let (tokens, _, calls) = manager(None);

        tokens.get_token().await.unwrap();
        tokens.invalidate().await;
        assert!(!tokens.is_authenticated().await);

        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_login_failure_is_reported_and_not_cached() {
        let (tokens, fail, _) = manager(None);
        fail.store(true, Ordering::SeqCst);

        let err = tokens.get_token().await.unwrap_err();
        assert!(err.is_login_failure());
        assert_eq!(tokens.login_count(), 0);

        fail.store(false, Ordering::SeqCst);
        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
        assert_eq!(tokens.login_count(), 1);
    }
}
