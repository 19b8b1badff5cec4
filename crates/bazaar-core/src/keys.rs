//! # Canonical Keys
//!
//! Deterministic mapping from an externally scoped identifier to the key the
//! shared store uses.
//!
//! ```text
//!   ("yandex", "53939895937") ──► SHA-1 name-based UUID (v5) ──► "6f0c…-…"
//!                                  under BAZAAR_NAMESPACE
//! ```
//!
//! Because the key is a pure function of the remote identifier, an upsert
//! keyed on it converges no matter how many times a record is re-fetched,
//! and there is no id mapping table to keep consistent.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::Platform;

/// Root namespace for every key this workspace derives.
///
/// Changing it re-keys every stored record.
pub const BAZAAR_NAMESPACE: Uuid = Uuid::from_u128(0x6d2f_41b7_9a0c_4c55_8e13_2b7a_f0c4_1d92);

/// Stable 128-bit record key, rendered in UUID text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Wraps a key read back from the store.
    pub fn from_stored(value: impl Into<String>) -> Self {
        CanonicalKey(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the canonical key for `external_id` within `namespace`.
///
/// ## Example
/// ```rust
/// use bazaar_core::keys::derive;
///
/// assert_eq!(derive("yandex", "1"), derive("yandex", "1"));
/// assert_ne!(derive("yandex", "1"), derive("yandex", "2"));
/// assert_ne!(derive("yandex", "1"), derive("uzum", "1"));
/// ```
pub fn derive(namespace: &str, external_id: &str) -> CanonicalKey {
    let name = format!("{}_{}", namespace, external_id);
    CanonicalKey(Uuid::new_v5(&BAZAAR_NAMESPACE, name.as_bytes()).to_string())
}

/// Key of an order: namespace is the platform tag.
pub fn order_key(platform: Platform, external_id: &str) -> CanonicalKey {
    derive(platform.as_str(), external_id)
}

/// Key of a chat: namespace is `"{platform}_chat"` so chat and order ids
/// that happen to be equal never share a key.
pub fn chat_key(platform: Platform, external_id: &str) -> CanonicalKey {
    derive(&format!("{}_chat", platform.as_str()), external_id)
}

/// Row key of a synced message, scoped by its chat.
pub fn message_key(chat_key: &CanonicalKey, external_message_id: &str) -> CanonicalKey {
    derive(chat_key.as_str(), external_message_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_is_deterministic() {
        for id in ["1", "53939895937", "order-äöü", ""] {
            assert_eq!(derive("yandex", id), derive("yandex", id));
        }
    }

    #[test]
    fn test_distinct_ids_give_distinct_keys() {
        let keys: HashSet<_> = (0..5_000)
            .map(|i| derive("uzum", &i.to_string()))
            .collect();
        assert_eq!(keys.len(), 5_000);
    }

    #[test]
    fn test_key_is_uuid_shaped() {
        let key = order_key(Platform::Kaspi, "42");
        assert!(Uuid::parse_str(key.as_str()).is_ok());
        assert_eq!(key.as_str().len(), 36);
    }

    #[test]
    fn test_order_and_chat_namespaces_differ() {
        assert_ne!(
            order_key(Platform::Yandex, "100"),
            chat_key(Platform::Yandex, "100")
        );
    }

    #[test]
    fn test_platforms_do_not_share_keys() {
        assert_ne!(order_key(Platform::Yandex, "7"), order_key(Platform::Uzum, "7"));
    }
}
