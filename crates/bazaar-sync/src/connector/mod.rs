//! # Platform Connectors
//!
//! One adapter per marketplace behind the [`PlatformConnector`] capability
//! set. Connectors speak the wire format, own their platform's
//! [`TokenManager`](crate::auth::TokenManager) and hand back remote shapes
//! from `bazaar-core`. They never touch the store.
//!
//! ## Wire Differences
//! ```text
//! ┌──────────┬───────────────────┬──────────────────┬──────────────────────┐
//! │          │ Yandex            │ Uzum             │ Kaspi                │
//! ├──────────┼───────────────────┼──────────────────┼──────────────────────┤
//! │ signing  │ sha256(key + ts)  │ sha256(key + ts) │ hmac-sha256(key, ts) │
//! │ paging   │ page / pagesCount │ offset / limit   │ meta.nextCursor      │
//! │ dates    │ dd-MM-yyyy (MSK)  │ epoch millis     │ RFC 3339             │
//! │ 401      │ HTTP 401 / 403    │ retval -1001/2   │ HTTP 401             │
//! │ send id  │ not returned      │ data.messageId   │ data.id              │
//! └──────────┴───────────────────┴──────────────────┴──────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use bazaar_core::{
    CoreResult, DeliveryReceipt, Money, Platform, RemoteChat, RemoteMessage, RemoteOrder,
};

use crate::config::{PlatformConfig, SyncSettings};
use crate::error::SyncResult;

pub mod http;
pub mod kaspi;
pub mod uzum;
pub mod yandex;

pub use http::ApiClient;
pub use kaspi::KaspiConnector;
pub use uzum::UzumConnector;
pub use yandex::YandexConnector;

/// Upper bound on pages fetched by one listing call.
pub const MAX_PAGES: usize = 100;

/// Items requested per page.
pub const PAGE_SIZE: usize = 50;

/// The capability set every marketplace adapter provides.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Orders created since `since`.
    async fn fetch_orders(&self, since: DateTime<Utc>) -> SyncResult<Vec<RemoteOrder>>;

    /// Every open conversation visible to the seller account.
    async fn fetch_chats(&self) -> SyncResult<Vec<RemoteChat>>;

    /// Full history of one chat, in the platform's order.
    async fn fetch_messages(&self, chat_external_id: &str) -> SyncResult<Vec<RemoteMessage>>;

    async fn send_message(&self, chat_external_id: &str, text: &str) -> SyncResult<DeliveryReceipt>;
}

/// Builds the connector for one configured platform.
pub fn build_connector(
    platform: Platform,
    config: &PlatformConfig,
    settings: &SyncSettings,
) -> SyncResult<Arc<dyn PlatformConnector>> {
    config.validate(platform)?;
    let connector: Arc<dyn PlatformConnector> = match platform {
        Platform::Yandex => Arc::new(YandexConnector::new(config, settings)?),
        Platform::Uzum => Arc::new(UzumConnector::new(config, settings)?),
        Platform::Kaspi => Arc::new(KaspiConnector::new(config, settings)?),
    };
    Ok(connector)
}

// =============================================================================
// Shared Wire Helpers
// =============================================================================

/// Identifier sent as either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Int(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Int(n) => write!(f, "{}", n),
            WireId::Text(s) => f.write_str(s),
        }
    }
}

/// Amount sent as either a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireAmount {
    Number(serde_json::Number),
    Text(String),
}

impl WireAmount {
    pub(crate) fn to_money(&self) -> CoreResult<Money> {
        match self {
            WireAmount::Number(n) => Money::from_json_number(n),
            WireAmount::Text(s) => Money::parse_decimal(s),
        }
    }
}

/// Converts wire records, dropping (and logging) the ones that do not
/// decode so one malformed entry does not hide the rest of the page.
pub(crate) fn decode_each<W, R>(
    platform: Platform,
    kind: &'static str,
    items: Vec<W>,
    convert: impl Fn(W) -> SyncResult<R>,
) -> Vec<R> {
    items
        .into_iter()
        .filter_map(|item| match convert(item) {
            Ok(remote) => Some(remote),
            Err(e) => {
                warn!(%platform, kind, error = %e, "Skipping undecodable record");
                None
            }
        })
        .collect()
}

/// Logs when a listing stopped because it hit [`MAX_PAGES`].
pub(crate) fn warn_truncated(platform: Platform, kind: &'static str) {
    warn!(%platform, kind, max_pages = MAX_PAGES, "Listing truncated at page limit");
}
