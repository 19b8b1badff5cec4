//! # Domain Types
//!
//! Canonical types shared by every platform, plus the normalized "remote"
//! shapes connectors hand to the sync jobs.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │   Connector output               Canonical (stored)                     │
//! │   ────────────────               ──────────────────                     │
//! │   RemoteOrder    ──from_remote──► Order   (key = v5(platform, id))      │
//! │   RemoteChat     ──from_remote──► Chat    (key = v5(platform_chat, id)) │
//! │   RemoteMessage  ──inbound─────► Message (Delivered)                    │
//! │                  dashboard ────► Message (Pending) ──relay──► platform  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Platform      │   │  OrderStatus    │   │    Sender       │       │
//! │  │  Yandex         │   │  New            │   │  Client         │       │
//! │  │  Uzum           │   │  Processing     │   │  Shop           │       │
//! │  │  Kaspi          │   │  Completed      │   │  System         │       │
//! │  └─────────────────┘   │  Cancelled      │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::keys::{self, CanonicalKey};
use crate::money::Money;
use crate::translate;

// =============================================================================
// Platform
// =============================================================================

/// The marketplaces this service synchronizes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Yandex Market (platform A).
    Yandex,
    /// Uzum Market (platform B).
    Uzum,
    /// Kaspi (platform C).
    Kaspi,
}

impl Platform {
    /// Every supported platform, in scheduling order.
    pub const ALL: [Platform; 3] = [Platform::Yandex, Platform::Uzum, Platform::Kaspi];

    /// The platform tag written to the store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::Yandex => "yandex",
            Platform::Uzum => "uzum",
            Platform::Kaspi => "kaspi",
        }
    }

    /// Upper-case form used for environment variable names.
    pub const fn env_prefix(&self) -> &'static str {
        match self {
            Platform::Yandex => "YANDEX",
            Platform::Uzum => "UZUM",
            Platform::Kaspi => "KASPI",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yandex" | "yandex_market" => Ok(Platform::Yandex),
            "uzum" | "uzum_market" => Ok(Platform::Uzum),
            "kaspi" => Ok(Platform::Kaspi),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Canonical order status. Every platform-specific code maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(OrderStatus::New),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Unknown order status: {}", other)),
        }
    }
}

// =============================================================================
// Sender
// =============================================================================

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The buyer.
    Client,
    /// The seller: either typed on the marketplace or relayed from here.
    Shop,
    /// Marketplace support or automated notices.
    System,
}

impl Sender {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Sender::Client => "client",
            Sender::Shop => "shop",
            Sender::System => "system",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Sender::Client),
            "shop" => Ok(Sender::Shop),
            "system" => Ok(Sender::System),
            other => Err(format!("Unknown sender: {}", other)),
        }
    }
}

// =============================================================================
// Remote Shapes (connector output)
// =============================================================================

/// An order as reported by a marketplace, already decoded from the wire
/// format but still carrying the platform's own status code.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOrder {
    pub external_id: String,
    pub status_code: String,
    pub amount: Money,
    pub product_name: String,
    pub customer_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A conversation visible to the seller account.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteChat {
    pub external_id: String,
    pub client_name: String,
    pub last_message: Option<String>,
    pub unread_count: i64,
    pub updated_at: Option<DateTime<Utc>>,
    /// Marketplace order the conversation is about, if any.
    pub order_id: Option<String>,
}

/// One entry of a chat's message history. The sender role is already
/// normalized by the connector.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMessage {
    pub external_id: String,
    pub text: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Result of a successful outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Message id assigned by the platform; `None` when it does not echo one.
    pub external_id: Option<String>,
}

// =============================================================================
// Order
// =============================================================================

/// Free-form order details kept alongside the canonical columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    pub customer_name: Option<String>,
    /// The platform's own status code, before translation.
    pub platform_status: String,
}

/// A canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub key: CanonicalKey,
    pub external_id: String,
    pub platform: Platform,
    pub status: OrderStatus,
    pub amount: Money,
    pub product_name: String,
    pub created_at: DateTime<Utc>,
    /// When this service last wrote the record.
    pub synced_at: DateTime<Utc>,
    pub metadata: OrderMetadata,
}

impl Order {
    /// Canonicalizes a remote order.
    ///
    /// A missing creation time falls back to `observed_at`.
    pub fn from_remote(platform: Platform, remote: &RemoteOrder, observed_at: DateTime<Utc>) -> Self {
        Order {
            key: keys::order_key(platform, &remote.external_id),
            external_id: remote.external_id.clone(),
            platform,
            status: translate::order_status(platform, &remote.status_code),
            amount: remote.amount,
            product_name: remote.product_name.clone(),
            created_at: remote.created_at.unwrap_or(observed_at),
            synced_at: observed_at,
            metadata: OrderMetadata {
                customer_name: remote.customer_name.clone(),
                platform_status: remote.status_code.clone(),
            },
        }
    }
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub order_id: Option<String>,
}

/// A canonical support conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub key: CanonicalKey,
    pub platform: Platform,
    pub external_id: String,
    pub client_name: String,
    /// Cached preview of the newest message.
    pub last_message: Option<String>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
    pub metadata: ChatMetadata,
}

impl Chat {
    pub fn from_remote(platform: Platform, remote: &RemoteChat, observed_at: DateTime<Utc>) -> Self {
        Chat {
            key: keys::chat_key(platform, &remote.external_id),
            platform,
            external_id: remote.external_id.clone(),
            client_name: remote.client_name.clone(),
            last_message: remote.last_message.clone(),
            unread_count: remote.unread_count,
            updated_at: remote.updated_at.unwrap_or(observed_at),
            metadata: ChatMetadata {
                order_id: remote.order_id.clone(),
            },
        }
    }
}

// =============================================================================
// Message
// =============================================================================

/// Delivery state of a message.
///
/// ```text
///   dashboard writes ──► Pending { last_error: None }
///                           │  send fails ──► Pending { last_error: Some(..) }
///                           │  send ok
///                           ▼
///                        Delivered { external_id }   ◄── every synced message
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    /// Authored locally, not yet accepted by the platform.
    Pending { last_error: Option<String> },
    /// Known to the platform under `external_id`.
    Delivered { external_id: String },
}

impl DeliveryState {
    pub fn is_pending(&self) -> bool {
        matches!(self, DeliveryState::Pending { .. })
    }

    pub fn external_id(&self) -> Option<&str> {
        match self {
            DeliveryState::Delivered { external_id } => Some(external_id),
            DeliveryState::Pending { .. } => None,
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Row key. Derived from (chat, external id) for synced messages,
    /// random for locally authored ones.
    pub id: String,
    pub chat_key: CanonicalKey,
    /// Platform of the owning chat.
    pub platform: Platform,
    pub text: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub delivery: DeliveryState,
}

impl Message {
    /// A message observed in a platform's history.
    pub fn inbound(chat: &Chat, remote: &RemoteMessage) -> Self {
        Message {
            id: keys::message_key(&chat.key, &remote.external_id).to_string(),
            chat_key: chat.key.clone(),
            platform: chat.platform,
            text: remote.text.clone(),
            sender: remote.sender,
            created_at: remote.created_at,
            is_read: remote.is_read,
            delivery: DeliveryState::Delivered {
                external_id: remote.external_id.clone(),
            },
        }
    }

    /// A reply authored locally, waiting for the outbound relay.
    pub fn outbound(chat: &Chat, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            chat_key: chat.key.clone(),
            platform: chat.platform,
            text: text.into(),
            sender: Sender::Shop,
            created_at: now,
            is_read: true,
            delivery: DeliveryState::Pending { last_error: None },
        }
    }

    /// True for shop-authored messages the relay still has to deliver.
    pub fn awaits_delivery(&self) -> bool {
        self.sender == Sender::Shop && self.delivery.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn remote_order() -> RemoteOrder {
        RemoteOrder {
            external_id: "53939895937".to_string(),
            status_code: "DELIVERED".to_string(),
            amount: Money::from_major(500),
            product_name: "Thermos 1L".to_string(),
            customer_name: Some("Ivan P.".to_string()),
            created_at: None,
        }
    }

    #[test]
    fn test_platform_round_trip_through_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert!("amazon".parse::<Platform>().is_err());
    }

    #[test]
    fn test_order_from_remote() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let order = Order::from_remote(Platform::Yandex, &remote_order(), now);

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.amount, Money::from_major(500));
        assert_eq!(order.platform.as_str(), "yandex");
        assert_eq!(order.created_at, now);
        assert_eq!(order.metadata.platform_status, "DELIVERED");
        assert_eq!(order.key, keys::order_key(Platform::Yandex, "53939895937"));
    }

    fn chat(platform: Platform, external_id: &str) -> Chat {
        let remote = RemoteChat {
            external_id: external_id.to_string(),
            client_name: "Aziza".to_string(),
            last_message: None,
            unread_count: 0,
            updated_at: None,
            order_id: None,
        };
        Chat::from_remote(platform, &remote, Utc::now())
    }

    #[test]
    fn test_inbound_message_key_is_stable() {
        let chat = chat(Platform::Uzum, "c-1");
        let remote = RemoteMessage {
            external_id: "m-1".to_string(),
            text: "Hello".to_string(),
            sender: Sender::Client,
            created_at: Utc::now(),
            is_read: false,
        };

        let a = Message::inbound(&chat, &remote);
        let b = Message::inbound(&chat, &remote);
        assert_eq!(a.id, b.id);
        assert_eq!(a.platform, Platform::Uzum);
        assert_eq!(a.delivery.external_id(), Some("m-1"));
        assert!(!a.awaits_delivery());
    }

    #[test]
    fn test_outbound_message_is_pending() {
        let msg = Message::outbound(&chat(Platform::Kaspi, "c-9"), "Your parcel ships today", Utc::now());

        assert!(msg.awaits_delivery());
        assert_eq!(msg.delivery.external_id(), None);
        assert_eq!(msg.sender, Sender::Shop);
    }
}
