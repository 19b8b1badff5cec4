//! # Sync Error Types
//!
//! Everything a connector, job or the scheduler can fail with.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Authentication      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  LoginFailed            │ │
//! │  │  MissingCred.   │  │  Timeout        │  │    → skip the cycle     │ │
//! │  │  InvalidUrl     │  │  HttpStatus     │  │  AuthRejected           │ │
//! │  │  ConfigLoad     │  │                 │  │    → token invalidated  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Protocol     │  │     Store       │  │      Data               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Unexpected     │  │  Store          │  │  InvalidRecord          │ │
//! │  │  PlatformError  │  │                 │  │  Validation             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bazaar_core::{CoreError, Platform, ValidationError};
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// No variant stops the scheduler; the categorizers below decide whether a
/// failure skips an item, a job or the rest of a cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// A platform credential is missing.
    #[error("{platform}: {field} is not configured")]
    MissingCredential { platform: Platform, field: String },

    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the platform.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A network or store call exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Non-2xx response that is not an authentication rejection.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// The login exchange itself failed; the cycle should be skipped.
    #[error("{platform} login failed: {reason}")]
    LoginFailed { platform: Platform, reason: String },

    /// A call was refused with the cached token; the token has been
    /// invalidated and the next call logs in again.
    #[error("{platform} rejected the access token")]
    AuthRejected { platform: Platform },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The platform answered with an application-level error.
    #[error("Platform error {code}: {message}")]
    PlatformError { code: i64, message: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// A remote record could not be canonicalized.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Input validation failed.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<bazaar_db::DbError> for SyncError {
    fn from(err: bazaar_db::DbError) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => SyncError::Validation(v),
            other => SyncError::InvalidRecord(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::UnexpectedResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// Convert reqwest errors to SyncError.
///
/// ## Error Mapping
/// ```text
/// timeout            → SyncError::Timeout
/// connect            → SyncError::ConnectionFailed
/// status (non-2xx)   → SyncError::HttpStatus
/// body decode        → SyncError::UnexpectedResponse
/// other              → SyncError::ConnectionFailed
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_connect() {
            SyncError::ConnectionFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            SyncError::UnexpectedResponse(err.to_string())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the platform refused the cached token.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, SyncError::AuthRejected { .. })
    }

    /// Returns true if the login exchange failed. The scheduler skips the
    /// remainder of the platform's cycle on this.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, SyncError::LoginFailed { .. })
    }

    /// Returns true if the same call may succeed on a later cycle.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - 5xx and 429 responses
    /// - Authentication (a fresh login happens next cycle)
    /// - Store failures
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_)
            | SyncError::Timeout(_)
            | SyncError::LoginFailed { .. }
            | SyncError::AuthRejected { .. }
            | SyncError::Store(_) => true,
            SyncError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingCredential { .. }
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout("GET /orders".into()).is_retryable());
        assert!(SyncError::HttpStatus { status: 503, body: String::new() }.is_retryable());
        assert!(SyncError::HttpStatus { status: 429, body: String::new() }.is_retryable());

        assert!(!SyncError::HttpStatus { status: 400, body: String::new() }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::UnexpectedResponse("no pager".into()).is_retryable());
    }

    #[test]
    fn test_auth_categories() {
        let rejected = SyncError::AuthRejected { platform: Platform::Uzum };
        let login = SyncError::LoginFailed {
            platform: Platform::Kaspi,
            reason: "HTTP 403".into(),
        };

        assert!(rejected.is_auth_rejected());
        assert!(!rejected.is_login_failure());
        assert!(login.is_login_failure());
        assert!(!login.is_auth_rejected());
        assert_eq!(login.to_string(), "kaspi login failed: HTTP 403");
    }

    #[test]
    fn test_core_validation_is_preserved() {
        let err: SyncError = CoreError::Validation(ValidationError::Required {
            field: "text".into(),
        })
        .into();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_config_errors() {
        let err = SyncError::MissingCredential {
            platform: Platform::Yandex,
            field: "campaign_id".into(),
        };
        assert!(err.is_config_error());
        assert_eq!(err.to_string(), "yandex: campaign_id is not configured");
    }
}
