//! # Login Signatures
//!
//! Every marketplace login carries `{sellerId, timestamp, signature}` where
//! the signature binds the shared secret to the current Unix time.
//!
//! ```text
//! Yandex, Uzum:  hex( SHA-256( secret || timestamp ) )
//! Kaspi:         hex( HMAC-SHA256( key = secret, msg = timestamp ) )
//! ```

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use bazaar_core::Platform;

use crate::error::{SyncError, SyncResult};

type HmacSha256 = Hmac<Sha256>;

/// Signs a login timestamp (Unix seconds) with the platform's rule.
pub fn sign(platform: Platform, secret: &str, timestamp: i64) -> SyncResult<String> {
    match platform {
        Platform::Yandex | Platform::Uzum => Ok(sha256_concat(secret, timestamp)),
        Platform::Kaspi => hmac_sha256(secret, timestamp),
    }
}

fn sha256_concat(secret: &str, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn hmac_sha256(secret: &str, timestamp: i64) -> SyncResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SyncError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
