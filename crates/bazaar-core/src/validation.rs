//! # Validation Module
//!
//! Checks applied at the two boundaries where untrusted text enters the
//! engine: records coming back from a marketplace, and replies typed into the
//! dashboard before the relay sends them.
//!
//! ```text
//!   marketplace JSON ──► validate_external_id ──► canonical key
//!   dashboard reply  ──► validate_outbound_text ──► connector.send_message
//! ```
//!
//! ## Usage
//! ```rust
//! use bazaar_core::validation::{validate_external_id, validate_outbound_text};
//! use bazaar_core::Platform;
//!
//! validate_external_id("53939895937").unwrap();
//! validate_outbound_text(Platform::Uzum, "Your order ships today").unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::Platform;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest external identifier accepted from any platform.
pub const MAX_EXTERNAL_ID_LEN: usize = 128;

// =============================================================================
// Remote Identifiers
// =============================================================================

/// Validates an identifier assigned by a marketplace.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most 128 characters
/// - No control characters
pub fn validate_external_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "external_id".to_string(),
        });
    }

    if id.chars().count() > MAX_EXTERNAL_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "external_id".to_string(),
            max: MAX_EXTERNAL_ID_LEN,
        });
    }

    if id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "external_id".to_string(),
            reason: "contains control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a canonical key read back from the store.
pub fn validate_canonical_key(key: &str) -> ValidationResult<()> {
    uuid::Uuid::parse_str(key)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidFormat {
            field: "key".to_string(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Outbound Text
// =============================================================================

/// Maximum reply length each marketplace accepts, in characters.
pub const fn max_message_len(platform: Platform) -> usize {
    match platform {
        Platform::Yandex => 4096,
        Platform::Uzum => 1000,
        Platform::Kaspi => 2000,
    }
}

/// Validates a reply before it is handed to a connector.
///
/// ## Example
/// ```rust
/// use bazaar_core::validation::validate_outbound_text;
/// use bazaar_core::Platform;
///
/// assert!(validate_outbound_text(Platform::Kaspi, "Thanks!").is_ok());
/// assert!(validate_outbound_text(Platform::Kaspi, "   ").is_err());
/// assert!(validate_outbound_text(Platform::Uzum, &"a".repeat(1001)).is_err());
/// ```
pub fn validate_outbound_text(platform: Platform, text: &str) -> ValidationResult<()> {
    if text.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "text".to_string(),
        });
    }

    let max = max_message_len(platform);
    if text.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: "text".to_string(),
            max,
        });
    }

    Ok(())
}
