//! # Kaspi Connector
//!
//! JSON:API style merchant API: resources arrive as `{ id, attributes }`,
//! listings are cursor-paginated through `meta.nextCursor`, timestamps are
//! RFC 3339. Logins are signed with HMAC-SHA256.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{
    timestamp, translate, DeliveryReceipt, Platform, RemoteChat, RemoteMessage, RemoteOrder,
};

use super::http::{path_segment, ApiClient};
use super::{decode_each, warn_truncated, PlatformConnector, WireAmount, WireId, MAX_PAGES, PAGE_SIZE};
use crate::auth::{Grant, TokenManager};
use crate::config::{PlatformConfig, SyncSettings};
use crate::error::SyncResult;

const PLATFORM: Platform = Platform::Kaspi;
const LOGIN_PATH: &str = "oauth/token";
const REJECTION_STATUSES: &[u16] = &[401];

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Document<T> {
    #[serde(default = "Vec::new")]
    data: Vec<Resource<T>>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    id: WireId,
    attributes: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAttributes {
    status: String,
    total_price: WireAmount,
    #[serde(default)]
    product_name: String,
    customer_name: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatAttributes {
    #[serde(default)]
    customer_name: String,
    last_message: Option<String>,
    #[serde(default)]
    unread_count: i64,
    updated_at: Option<String>,
    order_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageAttributes {
    #[serde(default)]
    text: String,
    author: String,
    created_at: String,
    #[serde(default)]
    read: bool,
}

#[derive(Debug, Deserialize)]
struct Created {
    data: CreatedResource,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: WireId,
}

// =============================================================================
// Translation
// =============================================================================

fn parse_grant(payload: Value) -> SyncResult<Grant> {
    let token: TokenResponse = serde_json::from_value(payload)?;
    Ok(Grant {
        access_token: token.access_token,
        expires_in: token.expires_in.map(Duration::from_secs),
    })
}

fn order_from(resource: Resource<OrderAttributes>) -> SyncResult<RemoteOrder> {
    let attrs = resource.attributes;
    Ok(RemoteOrder {
        external_id: resource.id.to_string(),
        status_code: attrs.status,
        amount: attrs.total_price.to_money()?,
        product_name: attrs.product_name,
        customer_name: attrs.customer_name,
        created_at: attrs.created_at.as_deref().map(timestamp::parse_rfc3339).transpose()?,
    })
}

fn chat_from(resource: Resource<ChatAttributes>) -> SyncResult<RemoteChat> {
    let attrs = resource.attributes;
    Ok(RemoteChat {
        external_id: resource.id.to_string(),
        client_name: attrs.customer_name,
        last_message: attrs.last_message,
        unread_count: attrs.unread_count,
        updated_at: attrs.updated_at.as_deref().map(timestamp::parse_rfc3339).transpose()?,
        order_id: attrs.order_code,
    })
}

fn message_from(resource: Resource<MessageAttributes>) -> SyncResult<RemoteMessage> {
    let attrs = resource.attributes;
    Ok(RemoteMessage {
        external_id: resource.id.to_string(),
        text: attrs.text,
        sender: translate::sender_role(PLATFORM, &attrs.author),
        created_at: timestamp::parse_rfc3339(&attrs.created_at)?,
        is_read: attrs.read,
    })
}

// =============================================================================
// Connector
// =============================================================================

/// Kaspi merchant API adapter.
pub struct KaspiConnector {
    api: ApiClient,
}

impl KaspiConnector {
    pub fn new(config: &PlatformConfig, settings: &SyncSettings) -> SyncResult<Self> {
        let api = ApiClient::new(PLATFORM, config, settings, LOGIN_PATH, parse_grant, REJECTION_STATUSES)?;
        Ok(KaspiConnector { api })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        self.api.tokens()
    }

    /// Follows `meta.nextCursor` until it is absent.
    async fn collect<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: &[(&str, String)],
        kind: &'static str,
    ) -> SyncResult<Vec<Resource<T>>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = filter.to_vec();
            query.push(("page[size]", PAGE_SIZE.to_string()));
            if let Some(c) = cursor.take() {
                query.push(("cursor", c));
            }

            let page: Document<T> = self.api.get(path, &query).await?;
            all.extend(page.data);
            match page.meta.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => return Ok(all),
            }
        }
        warn_truncated(PLATFORM, kind);
        Ok(all)
    }
}

#[async_trait]
impl PlatformConnector for KaspiConnector {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch_orders(&self, since: DateTime<Utc>) -> SyncResult<Vec<RemoteOrder>> {
        let filter = [(
            "filter[createdAfter]",
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        )];
        let resources = self.collect::<OrderAttributes>("orders", &filter, "orders").await?;
        Ok(decode_each(PLATFORM, "order", resources, order_from))
    }

    async fn fetch_chats(&self) -> SyncResult<Vec<RemoteChat>> {
        let resources = self.collect::<ChatAttributes>("chats", &[], "chats").await?;
        Ok(decode_each(PLATFORM, "chat", resources, chat_from))
    }

    async fn fetch_messages(&self, chat_external_id: &str) -> SyncResult<Vec<RemoteMessage>> {
        let path = format!("chats/{}/messages", path_segment(chat_external_id)?);
        let resources = self.collect::<MessageAttributes>(&path, &[], "messages").await?;
        Ok(decode_each(PLATFORM, "message", resources, message_from))
    }

    async fn send_message(&self, chat_external_id: &str, text: &str) -> SyncResult<DeliveryReceipt> {
        let path = format!("chats/{}/messages", path_segment(chat_external_id)?);
        let created: Created = self.api.post(&path, &json!({ "text": text })).await?;
        Ok(DeliveryReceipt {
            external_id: Some(created.data.id.to_string()),
        })
    }
}
