//! # Uzum Market Connector
//!
//! Seller open API. Every response is wrapped in an envelope:
//!
//! ```text
//! { "retval": 0, "message": null, "data": { ... } }
//!
//! retval  0            success
//! retval -1001, -1002  token expired / invalid  → AuthRejected
//! retval  other        application error        → PlatformError
//! ```
//!
//! Listings use offset/limit and end on a short page. Timestamps are epoch
//! milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
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
use crate::error::{SyncError, SyncResult};

const PLATFORM: Platform = Platform::Uzum;
const LOGIN_PATH: &str = "auth/login";
const REJECTION_STATUSES: &[u16] = &[401];

/// Envelope codes meaning the token is no longer accepted.
const TOKEN_EXPIRED: i64 = -1001;
const TOKEN_INVALID: i64 = -1002;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    retval: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OrdersData {
    #[serde(default)]
    orders: Vec<WireOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrder {
    order_id: WireId,
    status: String,
    total_price: WireAmount,
    #[serde(default)]
    product_title: String,
    customer_name: Option<String>,
    date_created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChatsData {
    #[serde(default)]
    chats: Vec<WireChat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChat {
    chat_id: WireId,
    #[serde(default)]
    customer_name: String,
    last_message: Option<String>,
    #[serde(default)]
    unread_count: i64,
    updated_at: Option<i64>,
    order_id: Option<WireId>,
}

#[derive(Debug, Deserialize)]
struct MessagesData {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    message_id: WireId,
    #[serde(default)]
    text: String,
    sender_type: String,
    created_at: i64,
    #[serde(default)]
    is_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentData {
    message_id: WireId,
}

// =============================================================================
// Translation
// =============================================================================

fn parse_grant(payload: Value) -> SyncResult<Grant> {
    let envelope: Envelope<TokenData> = serde_json::from_value(payload)?;
    if envelope.retval != 0 {
        return Err(SyncError::LoginFailed {
            platform: PLATFORM,
            reason: format!(
                "retval {}: {}",
                envelope.retval,
                envelope.message.unwrap_or_default()
            ),
        });
    }
    let data = envelope
        .data
        .ok_or_else(|| SyncError::UnexpectedResponse("login envelope without data".into()))?;
    Ok(Grant {
        access_token: data.token,
        expires_in: data.expires_in.map(Duration::from_secs),
    })
}

impl WireOrder {
    fn into_remote(self) -> SyncResult<RemoteOrder> {
        Ok(RemoteOrder {
            external_id: self.order_id.to_string(),
            status_code: self.status,
            amount: self.total_price.to_money()?,
            product_name: self.product_title,
            customer_name: self.customer_name,
            created_at: self.date_created.map(timestamp::from_epoch_millis).transpose()?,
        })
    }
}

impl WireChat {
    fn into_remote(self) -> SyncResult<RemoteChat> {
        Ok(RemoteChat {
            external_id: self.chat_id.to_string(),
            client_name: self.customer_name,
            last_message: self.last_message,
            unread_count: self.unread_count,
            updated_at: self.updated_at.map(timestamp::from_epoch_millis).transpose()?,
            order_id: self.order_id.map(|id| id.to_string()),
        })
    }
}

impl WireMessage {
    fn into_remote(self) -> SyncResult<RemoteMessage> {
        Ok(RemoteMessage {
            external_id: self.message_id.to_string(),
            text: self.text,
            sender: translate::sender_role(PLATFORM, &self.sender_type),
            created_at: timestamp::from_epoch_millis(self.created_at)?,
            is_read: self.is_read,
        })
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Uzum Market seller API adapter.
pub struct UzumConnector {
    api: ApiClient,
}

impl UzumConnector {
    pub fn new(config: &PlatformConfig, settings: &SyncSettings) -> SyncResult<Self> {
        let api = ApiClient::new(PLATFORM, config, settings, LOGIN_PATH, parse_grant, REJECTION_STATUSES)?;
        Ok(UzumConnector { api })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        self.api.tokens()
    }

    /// Unwraps the envelope, turning auth codes into a token rejection.
    async fn open<T>(&self, envelope: Envelope<T>) -> SyncResult<T> {
        match envelope.retval {
            0 => envelope
                .data
                .ok_or_else(|| SyncError::UnexpectedResponse("envelope without data".into())),
            TOKEN_EXPIRED | TOKEN_INVALID => Err(self.api.reject().await),
            code => Err(SyncError::PlatformError {
                code,
                message: envelope.message.unwrap_or_default(),
            }),
        }
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SyncResult<T> {
        let envelope: Envelope<T> = self.api.get(path, query).await?;
        self.open(envelope).await
    }

    /// Walks an offset/limit listing until a short page.
    async fn paged<D, W>(
        &self,
        path: &str,
        extra: &[(&str, String)],
        kind: &'static str,
        items: impl Fn(D) -> Vec<W>,
    ) -> SyncResult<Vec<W>>
    where
        D: DeserializeOwned,
    {
        let mut all = Vec::new();
        for page in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = extra.to_vec();
            query.push(("offset", (page * PAGE_SIZE).to_string()));
            query.push(("limit", PAGE_SIZE.to_string()));

            let batch = items(self.get_data::<D>(path, &query).await?);
            let short = batch.len() < PAGE_SIZE;
            all.extend(batch);
            if short {
                return Ok(all);
            }
        }
        warn_truncated(PLATFORM, kind);
        Ok(all)
    }
}

#[async_trait]
impl PlatformConnector for UzumConnector {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch_orders(&self, since: DateTime<Utc>) -> SyncResult<Vec<RemoteOrder>> {
        let extra = [("dateFrom", timestamp::to_epoch_millis(since).to_string())];
        let wire = self
            .paged("v1/orders", &extra, "orders", |d: OrdersData| d.orders)
            .await?;
        Ok(decode_each(PLATFORM, "order", wire, WireOrder::into_remote))
    }

    async fn fetch_chats(&self) -> SyncResult<Vec<RemoteChat>> {
        let wire = self
            .paged("v1/chats", &[], "chats", |d: ChatsData| d.chats)
            .await?;
        Ok(decode_each(PLATFORM, "chat", wire, WireChat::into_remote))
    }

    async fn fetch_messages(&self, chat_external_id: &str) -> SyncResult<Vec<RemoteMessage>> {
        let path = format!("v1/chats/{}/messages", path_segment(chat_external_id)?);
        let wire = self
            .paged(&path, &[], "messages", |d: MessagesData| d.messages)
            .await?;
        Ok(decode_each(PLATFORM, "message", wire, WireMessage::into_remote))
    }

    async fn send_message(&self, chat_external_id: &str, text: &str) -> SyncResult<DeliveryReceipt> {
        let path = format!("v1/chats/{}/messages", path_segment(chat_external_id)?);
        let envelope: Envelope<SentData> = self.api.post(&path, &json!({ "text": text })).await?;
        let sent = self.open(envelope).await?;
        Ok(DeliveryReceipt {
            external_id: Some(sent.message_id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::Sender;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> PlatformConfig {
        PlatformConfig {
            enabled: true,
            base_url: server.uri(),
            seller_id: "shop-7".into(),
            secret_key: "s3cr3t".into(),
            ..PlatformConfig::default()
        }
    }

    async fn connector(server: &MockServer) -> UzumConnector {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retval": 0,
                "data": { "token": "uz-token" }
            })))
            .mount(server)
            .await;
        UzumConnector::new(&config(server), &SyncSettings::default()).unwrap()
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "retval": 0, "data": data }))
    }

    #[tokio::test]
    async fn test_fetch_orders_stops_on_short_page() {
        let server = MockServer::start().await;
        let uzum = connector(&server).await;

        let full: Vec<Value> = (0..PAGE_SIZE)
            .map(|i| json!({ "orderId": i, "status": "CREATED", "totalPrice": "10.00" }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v1/orders"))
            .and(query_param("offset", "0"))
            .respond_with(ok(json!({ "orders": full })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/orders"))
            .and(query_param("offset", PAGE_SIZE.to_string()))
            .respond_with(ok(json!({ "orders": [
                { "orderId": "last", "status": "DELIVERED", "totalPrice": 1250.5, "dateCreated": 1760688000000i64 }
            ]})))
            .expect(1)
            .mount(&server)
            .await;

        let orders = uzum.fetch_orders(Utc::now()).await.unwrap();
        assert_eq!(orders.len(), PAGE_SIZE + 1);
        let last = orders.last().unwrap();
        assert_eq!(last.external_id, "last");
        assert_eq!(last.amount.minor_units(), 125050);
        assert_eq!(last.created_at.unwrap().timestamp_millis(), 1_760_688_000_000);
    }

    #[tokio::test]
    async fn test_envelope_auth_code_invalidates_token() {
        let server = MockServer::start().await;
        let uzum = connector(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/chats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retval": -1001,
                "message": "token expired"
            })))
            .mount(&server)
            .await;

        let err = uzum.fetch_chats().await.unwrap_err();
        assert!(err.is_auth_rejected());
        assert!(!uzum.tokens().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_other_envelope_code_is_platform_error() {
        let server = MockServer::start().await;
        let uzum = connector(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/chats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retval": 2003,
                "message": "rate limited"
            })))
            .mount(&server)
            .await;

        let err = uzum.fetch_chats().await.unwrap_err();
        assert!(matches!(err, SyncError::PlatformError { code: 2003, .. }));
        assert!(uzum.tokens().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_messages_and_send() {
        let server = MockServer::start().await;
        let uzum = connector(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/chats/c-1/messages"))
            .respond_with(ok(json!({ "messages": [
                { "messageId": "m-1", "text": "Salom", "senderType": "BUYER", "createdAt": 1760688000000i64 },
                { "messageId": "m-2", "text": "Hello", "senderType": "SELLER", "createdAt": 1760688060000i64, "isRead": true }
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chats/c-1/messages"))
            .respond_with(ok(json!({ "messageId": "m-3" })))
            .mount(&server)
            .await;

        let messages = uzum.fetch_messages("c-1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::Client);
        assert_eq!(messages[1].sender, Sender::Shop);

        let receipt = uzum.send_message("c-1", "Rahmat").await.unwrap();
        assert_eq!(receipt.external_id.as_deref(), Some("m-3"));
    }

    #[tokio::test]
    async fn test_chat_id_is_escaped_in_path() {
        let server = MockServer::start().await;
        let uzum = connector(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/chats/shop%2F7%3Fx/messages"))
            .respond_with(ok(json!({ "messageId": 91 })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = uzum.send_message("shop/7?x", "Rahmat").await.unwrap();
        assert_eq!(receipt.external_id.as_deref(), Some("91"));
    }

    #[tokio::test]
    async fn test_login_envelope_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retval": -2001,
                "message": "bad signature"
            })))
            .mount(&server)
            .await;

        let uzum = UzumConnector::new(&config(&server), &SyncSettings::default()).unwrap();
        let err = uzum.fetch_chats().await.unwrap_err();
        assert!(err.is_login_failure());
        assert!(err.to_string().contains("bad signature"));
    }
}
