//! # Error Types
//!
//! Domain-specific error types for bazaar-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bazaar-core errors (this file)                                        │
//! │  ├── CoreError        - Remote data that cannot be canonicalized       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bazaar-db errors (separate crate)                                     │
//! │  └── DbError          - Store operation failures                       │
//! │                                                                         │
//! │  bazaar-sync errors (separate crate)                                   │
//! │  └── SyncError        - Network, auth, config, job failures            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → log line              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while turning remote marketplace data into canonical records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A platform tag that is not one of the supported marketplaces.
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// A remote timestamp that does not match the platform's date format.
    ///
    /// ## When This Occurs
    /// - Marketplace changed its date format
    /// - Field was present but empty
    #[error("Invalid timestamp '{value}': expected {expected}")]
    InvalidTimestamp { value: String, expected: String },

    /// A remote monetary value that cannot be represented in minor units.
    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    /// A stored delivery state that contradicts itself.
    #[error("Inconsistent delivery state for message {message_id}: {reason}")]
    InconsistentDelivery { message_id: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
