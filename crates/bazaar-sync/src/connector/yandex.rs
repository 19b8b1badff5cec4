//! # Yandex Market Connector
//!
//! Campaign-scoped partner API. Page-numbered listings, `dd-MM-yyyy` dates in
//! Moscow time, and no message id echoed back on send.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use bazaar_core::{
    timestamp, translate, DeliveryReceipt, Money, Platform, RemoteChat, RemoteMessage, RemoteOrder,
};

use super::http::{path_segment, ApiClient};
use super::{decode_each, warn_truncated, PlatformConnector, WireAmount, WireId, MAX_PAGES, PAGE_SIZE};
use crate::auth::{Grant, TokenManager};
use crate::config::{PlatformConfig, SyncSettings};
use crate::error::{SyncError, SyncResult};

const PLATFORM: Platform = Platform::Yandex;
const LOGIN_PATH: &str = "auth/token";
const REJECTION_STATUSES: &[u16] = &[401, 403];

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pager {
    pages_count: Option<usize>,
}

impl Pager {
    fn has_more(pager: &Option<Pager>, page: usize) -> bool {
        pager
            .as_ref()
            .and_then(|p| p.pages_count)
            .is_some_and(|count| page < count)
    }
}

#[derive(Debug, Deserialize)]
struct OrdersPage {
    #[serde(default)]
    orders: Vec<WireOrder>,
    pager: Option<Pager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrder {
    id: WireId,
    status: String,
    buyer_total: Option<WireAmount>,
    creation_date: Option<String>,
    #[serde(default)]
    items: Vec<WireItem>,
    buyer: Option<WireBuyer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItem {
    offer_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBuyer {
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatsPage {
    #[serde(default)]
    chats: Vec<WireChat>,
    pager: Option<Pager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChat {
    chat_id: WireId,
    order_id: Option<WireId>,
    customer_name: Option<String>,
    last_message: Option<String>,
    #[serde(default)]
    unread_count: i64,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<WireMessage>,
    pager: Option<Pager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    message_id: WireId,
    #[serde(default)]
    message: String,
    sender: String,
    created_at: String,
    #[serde(default)]
    read: bool,
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

impl WireOrder {
    fn into_remote(self) -> SyncResult<RemoteOrder> {
        let amount = match &self.buyer_total {
            Some(total) => total.to_money()?,
            None => Money::zero(),
        };
        let created_at = self
            .creation_date
            .as_deref()
            .map(timestamp::parse_moscow_dmy)
            .transpose()?;
        let product_name = self
            .items
            .iter()
            .filter_map(|i| i.offer_name.as_deref())
            .collect::<Vec<_>>()
            .join(", ");
        let customer_name = self.buyer.and_then(|b| {
            let full = [b.first_name, b.last_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            (!full.is_empty()).then_some(full)
        });

        Ok(RemoteOrder {
            external_id: self.id.to_string(),
            status_code: self.status,
            amount,
            product_name,
            customer_name,
            created_at,
        })
    }
}

impl WireChat {
    fn into_remote(self) -> SyncResult<RemoteChat> {
        Ok(RemoteChat {
            external_id: self.chat_id.to_string(),
            client_name: self.customer_name.unwrap_or_default(),
            last_message: self.last_message,
            unread_count: self.unread_count,
            updated_at: self
                .updated_at
                .as_deref()
                .map(timestamp::parse_moscow_dmy)
                .transpose()?,
            order_id: self.order_id.map(|id| id.to_string()),
        })
    }
}

impl WireMessage {
    fn into_remote(self) -> SyncResult<RemoteMessage> {
        Ok(RemoteMessage {
            external_id: self.message_id.to_string(),
            text: self.message,
            sender: translate::sender_role(PLATFORM, &self.sender),
            created_at: timestamp::parse_moscow_dmy(&self.created_at)?,
            is_read: self.read,
        })
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Yandex Market partner API adapter.
pub struct YandexConnector {
    api: ApiClient,
    campaign_id: String,
}

impl YandexConnector {
    pub fn new(config: &PlatformConfig, settings: &SyncSettings) -> SyncResult<Self> {
        let campaign_id = config
            .campaign_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SyncError::MissingCredential {
                platform: PLATFORM,
                field: "campaign_id".into(),
            })?;
        let api = ApiClient::new(PLATFORM, config, settings, LOGIN_PATH, parse_grant, REJECTION_STATUSES)?;
        Ok(YandexConnector { api, campaign_id })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        self.api.tokens()
    }

    fn campaign_path(&self, rest: &str) -> String {
        format!("campaigns/{}/{}", self.campaign_id, rest)
    }

    fn page_query(page: usize) -> Vec<(&'static str, String)> {
        vec![("page", page.to_string()), ("pageSize", PAGE_SIZE.to_string())]
    }
}

#[async_trait]
impl PlatformConnector for YandexConnector {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch_orders(&self, since: DateTime<Utc>) -> SyncResult<Vec<RemoteOrder>> {
        let path = self.campaign_path("orders");
        let mut orders = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut query = Self::page_query(page);
            query.push(("fromDate", timestamp::format_moscow_date(since)));

            let body: OrdersPage = self.api.get(&path, &query).await?;
            debug!(platform = %PLATFORM, page, count = body.orders.len(), "Fetched order page");
            orders.extend(decode_each(PLATFORM, "order", body.orders, WireOrder::into_remote));

            if !Pager::has_more(&body.pager, page) {
                return Ok(orders);
            }
        }
        warn_truncated(PLATFORM, "orders");
        Ok(orders)
    }

    async fn fetch_chats(&self) -> SyncResult<Vec<RemoteChat>> {
        let path = self.campaign_path("chats");
        let mut chats = Vec::new();

        for page in 1..=MAX_PAGES {
            let body: ChatsPage = self.api.get(&path, &Self::page_query(page)).await?;
            chats.extend(decode_each(PLATFORM, "chat", body.chats, WireChat::into_remote));
            if !Pager::has_more(&body.pager, page) {
                return Ok(chats);
            }
        }
        warn_truncated(PLATFORM, "chats");
        Ok(chats)
    }

    async fn fetch_messages(&self, chat_external_id: &str) -> SyncResult<Vec<RemoteMessage>> {
        let path = self.campaign_path(&format!("chats/{}/history", path_segment(chat_external_id)?));
        let mut messages = Vec::new();

        for page in 1..=MAX_PAGES {
            let body: HistoryPage = self.api.get(&path, &Self::page_query(page)).await?;
            messages.extend(decode_each(PLATFORM, "message", body.messages, WireMessage::into_remote));
            if !Pager::has_more(&body.pager, page) {
                return Ok(messages);
            }
        }
        warn_truncated(PLATFORM, "messages");
        Ok(messages)
    }

    async fn send_message(&self, chat_external_id: &str, text: &str) -> SyncResult<DeliveryReceipt> {
        let path = self.campaign_path(&format!("chats/{}/messages", path_segment(chat_external_id)?));
        let _: Value = self.api.post(&path, &json!({ "message": text })).await?;
        // The partner API acknowledges without a message id.
        Ok(DeliveryReceipt { external_id: None })
    }
}
