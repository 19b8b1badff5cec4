//! # Message Repository
//!
//! Synced and locally authored messages share one table.
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  chat sync ──► upsert_inbound ──► ON CONFLICT (chat_id, ext_id) update │
//! │                                                                         │
//! │  dashboard ──► queue_outbound ──► ext_id NULL, is_sent 0               │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  relay ─────► pending_outbound(platform): never-tried rows, then rows  │
//! │               with a send_error, each oldest first                      │
//! │                     │                                                   │
//! │          ┌──────────┴──────────┐                                        │
//! │          ▼                     ▼                                        │
//! │   mark_delivered          mark_failed                                   │
//! │   ext_id = X, is_sent 1   send_error = "..", still pending              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Once `external_message_id` is set, the next chat sync that sees the same
//! message on the platform lands on this row through the conflict key
//! instead of inserting a duplicate.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use bazaar_core::{timestamp, CanonicalKey, CoreError, DeliveryState, Message, Platform, Sender};

use super::chats::ChatRepository;
use super::{boolean, datetime, opt_text, parsed, text};
use crate::error::{DbError, DbResult};
use crate::store::{Filter, Record, RecordStore, SortOrder, Table};

const TABLE: Table = Table::PlatformMessages;

/// Repository for chat messages and the outbound queue.
#[derive(Clone)]
pub struct MessageRepository {
    store: Arc<dyn RecordStore>,
}

impl MessageRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        MessageRepository { store }
    }

    /// Upserts a message observed in a platform's history.
    pub async fn upsert_inbound(&self, message: &Message) -> DbResult<()> {
        if message.delivery.is_pending() {
            return Err(DbError::decode(
                TABLE.name(),
                "external_message_id",
                "inbound message without an external id",
            ));
        }
        self.store
            .upsert(TABLE, to_record(message), TABLE.conflict_key())
            .await
    }

    /// Writes a reply authored locally; the relay picks it up next cycle.
    ///
    /// Fails with `NotFound` when the chat is not stored.
    pub async fn queue_outbound(&self, chat_key: &CanonicalKey, text: &str) -> DbResult<Message> {
        let chat = ChatRepository::new(self.store.clone())
            .get(chat_key)
            .await?
            .ok_or_else(|| DbError::not_found("chat", chat_key.as_str()))?;

        let message = Message::outbound(&chat, text, Utc::now());
        debug!(chat = %chat_key, platform = %chat.platform, message_id = %message.id, "Queuing outbound message");
        self.store.upsert(TABLE, to_record(&message), &["id"]).await?;
        Ok(message)
    }

    /// Shop messages of one platform still waiting for delivery.
    ///
    /// Rows never tried come first, then rows whose last send failed, each
    /// group oldest first. Rows that keep failing therefore never hold back
    /// a fresh reply.
    pub async fn pending_outbound(&self, platform: Platform, limit: usize) -> DbResult<Vec<Message>> {
        let base = Filter::new()
            .eq("platform", platform.as_str())
            .eq("sender", Sender::Shop.as_str())
            .is_null("external_message_id");

        let fresh = base
            .clone()
            .is_null("send_error")
            .order_by("created_at", SortOrder::Asc)
            .limit(limit);
        let mut rows = self.store.select(TABLE, &fresh).await?;

        if rows.len() < limit {
            let retried = base
                .not_null("send_error")
                .order_by("created_at", SortOrder::Asc)
                .limit(limit - rows.len());
            rows.extend(self.store.select(TABLE, &retried).await?);
        }

        rows.iter().map(from_record).collect()
    }

    /// Records the platform's id for a delivered message.
    pub async fn mark_delivered(&self, id: &str, external_id: &str) -> DbResult<()> {
        let mut patch = Record::new();
        patch.insert("external_message_id".into(), Value::from(external_id));
        patch.insert("is_sent".into(), Value::Bool(true));
        patch.insert("send_error".into(), Value::Null);

        let touched = self
            .store
            .update(TABLE, patch, &Filter::new().eq("id", id))
            .await?;
        if touched == 0 {
            return Err(DbError::not_found("message", id));
        }
        Ok(())
    }

    /// Annotates a failed delivery; the message stays pending.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let mut patch = Record::new();
        patch.insert("send_error".into(), Value::from(error));

        let touched = self
            .store
            .update(TABLE, patch, &Filter::new().eq("id", id))
            .await?;
        if touched == 0 {
            warn!(message_id = %id, "Failed message vanished before annotation");
            return Err(DbError::not_found("message", id));
        }
        Ok(())
    }

    /// Whether a platform message is already stored for this chat.
    pub async fn exists(&self, chat_key: &CanonicalKey, external_id: &str) -> DbResult<bool> {
        let filter = Filter::new()
            .eq("chat_id", chat_key.as_str())
            .eq("external_message_id", external_id)
            .limit(1);
        Ok(!self.store.select(TABLE, &filter).await?.is_empty())
    }

    /// Full history of a chat in creation order.
    pub async fn for_chat(&self, chat_key: &CanonicalKey) -> DbResult<Vec<Message>> {
        let filter = Filter::new()
            .eq("chat_id", chat_key.as_str())
            .order_by("created_at", SortOrder::Asc);
        self.store
            .select(TABLE, &filter)
            .await?
            .iter()
            .map(from_record)
            .collect()
    }

    pub async fn count_for_chat(&self, chat_key: &CanonicalKey) -> DbResult<usize> {
        let filter = Filter::new().eq("chat_id", chat_key.as_str());
        Ok(self.store.select(TABLE, &filter).await?.len())
    }
}

fn to_record(message: &Message) -> Record {
    let (external_id, is_sent, send_error) = match &message.delivery {
        DeliveryState::Delivered { external_id } => (Some(external_id.as_str()), true, None),
        DeliveryState::Pending { last_error } => (None, false, last_error.as_deref()),
    };
    let value = json!({
        "id": message.id,
        "chat_id": message.chat_key.as_str(),
        "platform": message.platform.as_str(),
        "external_message_id": external_id,
        "text": message.text,
        "sender": message.sender.as_str(),
        "created_at": timestamp::to_store(message.created_at),
        "is_read": message.is_read,
        "is_sent": is_sent,
        "send_error": send_error,
    });
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn from_record(record: &Record) -> DbResult<Message> {
    let id = text(TABLE, record, "id")?;
    let external_id = opt_text(TABLE, record, "external_message_id")?;
    let is_sent = boolean(TABLE, record, "is_sent")?;

    let delivery = match external_id {
        Some(external_id) => DeliveryState::Delivered { external_id },
        None if is_sent => {
            let err = CoreError::InconsistentDelivery {
                message_id: id,
                reason: "marked sent without an external id".to_string(),
            };
            return Err(DbError::decode(TABLE.name(), "is_sent", err.to_string()));
        }
        None => DeliveryState::Pending {
            last_error: opt_text(TABLE, record, "send_error")?,
        },
    };

    Ok(Message {
        id,
        chat_key: CanonicalKey::from_stored(text(TABLE, record, "chat_id")?),
        platform: parsed(TABLE, record, "platform")?,
        text: text(TABLE, record, "text")?,
        sender: parsed(TABLE, record, "sender")?,
        created_at: datetime(TABLE, record, "created_at")?,
        is_read: boolean(TABLE, record, "is_read")?,
        delivery,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::pool::SqliteStore;
    use bazaar_core::{keys, Chat, RemoteChat, RemoteMessage};
    use chrono::{Duration, TimeZone};

    async fn stores() -> Vec<Arc<dyn RecordStore>> {
        let sqlite: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let memory: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        vec![sqlite, memory]
    }

    async fn seed_chat(store: &Arc<dyn RecordStore>, platform: Platform, external_id: &str) -> Chat {
        let remote = RemoteChat {
            external_id: external_id.to_string(),
            client_name: "Aziza".to_string(),
            last_message: None,
            unread_count: 0,
            updated_at: None,
            order_id: None,
        };
        let chat = Chat::from_remote(platform, &remote, Utc::now());
        ChatRepository::new(store.clone()).upsert(&chat).await.unwrap();
        chat
    }

    fn inbound(chat: &Chat, external_id: &str, minute: u32) -> Message {
        let remote = RemoteMessage {
            external_id: external_id.to_string(),
            text: format!("message {}", external_id),
            sender: Sender::Client,
            created_at: Utc.with_ymd_and_hms(2026, 10, 17, 9, minute, 0).unwrap(),
            is_read: false,
        };
        Message::inbound(chat, &remote)
    }

    /// Writes a pending reply with a fixed id and creation minute.
    async fn queue_at(store: &Arc<dyn RecordStore>, chat: &Chat, n: u32) -> String {
        let mut message = Message::outbound(
            chat,
            format!("reply {}", n),
            Utc.with_ymd_and_hms(2026, 10, 17, 9, n, 0).unwrap(),
        );
        message.id = keys::derive("test", &format!("{}-{}", chat.external_id, n)).to_string();
        store.upsert(TABLE, to_record(&message), &["id"]).await.unwrap();
        message.id
    }

    #[tokio::test]
    async fn test_inbound_upsert_is_idempotent() {
        for store in stores().await {
            let chat = seed_chat(&store, Platform::Uzum, "c-1").await;
            let repo = MessageRepository::new(store);

            for _ in 0..3 {
                repo.upsert_inbound(&inbound(&chat, "m-1", 0)).await.unwrap();
                repo.upsert_inbound(&inbound(&chat, "m-2", 1)).await.unwrap();
            }

            assert_eq!(repo.count_for_chat(&chat.key).await.unwrap(), 2);
            assert!(repo.exists(&chat.key, "m-1").await.unwrap());
            assert!(!repo.exists(&chat.key, "m-3").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_outbound_lifecycle() {
        for store in stores().await {
            let chat = seed_chat(&store, Platform::Uzum, "c-1").await;
            let repo = MessageRepository::new(store);

            let queued = repo.queue_outbound(&chat.key, "Ships today").await.unwrap();
            assert_eq!(queued.platform, Platform::Uzum);
            let pending = repo.pending_outbound(Platform::Uzum, 10).await.unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, queued.id);
            assert!(pending[0].awaits_delivery());

            repo.mark_failed(&queued.id, "HTTP 500").await.unwrap();
            let pending = repo.pending_outbound(Platform::Uzum, 10).await.unwrap();
            assert_eq!(
                pending[0].delivery,
                DeliveryState::Pending {
                    last_error: Some("HTTP 500".to_string())
                }
            );

            repo.mark_delivered(&queued.id, "x-99").await.unwrap();
            assert!(repo.pending_outbound(Platform::Uzum, 10).await.unwrap().is_empty());

            let history = repo.for_chat(&chat.key).await.unwrap();
            assert_eq!(history[0].delivery.external_id(), Some("x-99"));
        }
    }

    #[tokio::test]
    async fn test_queue_outbound_requires_stored_chat() {
        for store in stores().await {
            let repo = MessageRepository::new(store);
            let err = repo
                .queue_outbound(&keys::chat_key(Platform::Kaspi, "ghost"), "hello")
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::NotFound { .. }));
        }
    }

    #[tokio::test]
    async fn test_pending_never_collides_with_synced() {
        for store in stores().await {
            let chat = seed_chat(&store, Platform::Uzum, "c-1").await;
            let repo = MessageRepository::new(store);

            repo.upsert_inbound(&inbound(&chat, "m-1", 0)).await.unwrap();
            repo.queue_outbound(&chat.key, "first").await.unwrap();
            repo.queue_outbound(&chat.key, "second").await.unwrap();
            repo.upsert_inbound(&inbound(&chat, "m-1", 0)).await.unwrap();

            assert_eq!(repo.count_for_chat(&chat.key).await.unwrap(), 3);
            assert_eq!(repo.pending_outbound(Platform::Uzum, 10).await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_delivered_message_absorbs_its_synced_copy() {
        for store in stores().await {
            let chat = seed_chat(&store, Platform::Uzum, "c-1").await;
            let repo = MessageRepository::new(store);

            let queued = repo.queue_outbound(&chat.key, "Ships today").await.unwrap();
            repo.mark_delivered(&queued.id, "x-5").await.unwrap();

            let echo = Message::inbound(
                &chat,
                &RemoteMessage {
                    external_id: "x-5".to_string(),
                    text: "Ships today".to_string(),
                    sender: Sender::Shop,
                    created_at: queued.created_at + Duration::seconds(1),
                    is_read: true,
                },
            );
            repo.upsert_inbound(&echo).await.unwrap();

            let history = repo.for_chat(&chat.key).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].id, queued.id);
        }
    }

    #[tokio::test]
    async fn test_pending_outbound_is_oldest_first_and_bounded() {
        for store in stores().await {
            let chat = seed_chat(&store, Platform::Uzum, "c-1").await;
            let repo = MessageRepository::new(store.clone());

            let mut expected = Vec::new();
            for i in 0..5 {
                expected.push(queue_at(&store, &chat, i).await);
            }

            let pending = repo.pending_outbound(Platform::Uzum, 3).await.unwrap();
            let ids: Vec<_> = pending.into_iter().map(|m| m.id).collect();
            assert_eq!(ids, expected[..3].to_vec());
        }
    }

    #[tokio::test]
    async fn test_pending_outbound_ignores_other_platforms_backlog() {
        for store in stores().await {
            let kaspi = seed_chat(&store, Platform::Kaspi, "k-1").await;
            let uzum = seed_chat(&store, Platform::Uzum, "u-1").await;
            let repo = MessageRepository::new(store.clone());

            for i in 0..20 {
                queue_at(&store, &kaspi, i).await;
            }
            let reply = queue_at(&store, &uzum, 30).await;

            let pending = repo.pending_outbound(Platform::Uzum, 5).await.unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, reply);
            assert_eq!(repo.pending_outbound(Platform::Kaspi, 5).await.unwrap().len(), 5);
        }
    }

    #[tokio::test]
    async fn test_failed_rows_queue_behind_fresh_ones() {
        for store in stores().await {
            let chat = seed_chat(&store, Platform::Uzum, "c-1").await;
            let repo = MessageRepository::new(store.clone());

            let old_a = queue_at(&store, &chat, 0).await;
            let old_b = queue_at(&store, &chat, 1).await;
            let fresh = queue_at(&store, &chat, 2).await;
            repo.mark_failed(&old_a, "HTTP 502").await.unwrap();
            repo.mark_failed(&old_b, "too long").await.unwrap();

            let ids: Vec<_> = repo
                .pending_outbound(Platform::Uzum, 10)
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.id)
                .collect();
            assert_eq!(ids, vec![fresh.clone(), old_a.clone(), old_b]);

            let first: Vec<_> = repo
                .pending_outbound(Platform::Uzum, 1)
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.id)
                .collect();
            assert_eq!(first, vec![fresh]);
        }
    }

    #[tokio::test]
    async fn test_mark_delivered_unknown_message() {
        for store in stores().await {
            let repo = MessageRepository::new(store);
            let err = repo.mark_delivered("missing", "x").await.unwrap_err();
            assert!(matches!(err, DbError::NotFound { .. }));
        }
    }
}
