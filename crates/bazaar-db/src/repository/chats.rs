//! # Chat Repository

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use bazaar_core::{timestamp, CanonicalKey, Chat, ChatMetadata, Platform};

use super::{datetime, integer, json_column, opt_text, parsed, text};
use crate::error::{DbError, DbResult};
use crate::store::{Filter, Record, RecordStore, SortOrder, Table};

const TABLE: Table = Table::PlatformChats;

/// Repository for support conversations.
#[derive(Clone)]
pub struct ChatRepository {
    store: Arc<dyn RecordStore>,
}

impl ChatRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        ChatRepository { store }
    }

    /// Inserts or refreshes a chat under its canonical key.
    pub async fn upsert(&self, chat: &Chat) -> DbResult<()> {
        debug!(
            platform = %chat.platform,
            chat_id = %chat.external_id,
            "Upserting chat"
        );
        self.store
            .upsert(TABLE, to_record(chat), TABLE.conflict_key())
            .await
    }

    pub async fn get(&self, key: &CanonicalKey) -> DbResult<Option<Chat>> {
        let rows = self
            .store
            .select(TABLE, &Filter::new().eq("id", key.as_str()).limit(1))
            .await?;
        rows.first().map(from_record).transpose()
    }

    /// Replaces the cached last-message preview.
    pub async fn set_preview(
        &self,
        key: &CanonicalKey,
        text: &str,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut patch = Record::new();
        patch.insert("last_message".into(), Value::from(text));
        patch.insert("updated_at".into(), Value::from(timestamp::to_store(updated_at)));

        let touched = self
            .store
            .update(TABLE, patch, &Filter::new().eq("id", key.as_str()))
            .await?;
        if touched == 0 {
            return Err(DbError::not_found("chat", key.as_str()));
        }
        Ok(())
    }

    /// Chats of one platform, most recently active first.
    pub async fn list(&self, platform: Platform, limit: usize) -> DbResult<Vec<Chat>> {
        let filter = Filter::new()
            .eq("platform", platform.as_str())
            .order_by("updated_at", SortOrder::Desc)
            .limit(limit);
        self.store
            .select(TABLE, &filter)
            .await?
            .iter()
            .map(from_record)
            .collect()
    }
}

fn to_record(chat: &Chat) -> Record {
    let value = json!({
        "id": chat.key.as_str(),
        "platform": chat.platform.as_str(),
        "external_id": chat.external_id,
        "client_name": chat.client_name,
        "last_message": chat.last_message,
        "unread_count": chat.unread_count,
        "updated_at": timestamp::to_store(chat.updated_at),
        "metadata": chat.metadata,
    });
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn from_record(record: &Record) -> DbResult<Chat> {
    Ok(Chat {
        key: CanonicalKey::from_stored(text(TABLE, record, "id")?),
        platform: parsed(TABLE, record, "platform")?,
        external_id: text(TABLE, record, "external_id")?,
        client_name: text(TABLE, record, "client_name")?,
        last_message: opt_text(TABLE, record, "last_message")?,
        unread_count: integer(TABLE, record, "unread_count")?,
        updated_at: datetime(TABLE, record, "updated_at")?,
        metadata: json_column::<ChatMetadata>(TABLE, record, "metadata")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::pool::SqliteStore;
    use bazaar_core::RemoteChat;
    use chrono::TimeZone;

    fn chat() -> Chat {
        let remote = RemoteChat {
            external_id: "chat-77".to_string(),
            client_name: "Aziza".to_string(),
            last_message: Some("Hello".to_string()),
            unread_count: 2,
            updated_at: Some(Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap()),
            order_id: Some("o-1".to_string()),
        };
        Chat::from_remote(Platform::Uzum, &remote, Utc::now())
    }

    async fn repos() -> Vec<ChatRepository> {
        let sqlite: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let memory: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        vec![ChatRepository::new(sqlite), ChatRepository::new(memory)]
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        for repo in repos().await {
            let chat = chat();
            repo.upsert(&chat).await.unwrap();
            repo.upsert(&chat).await.unwrap();

            let stored = repo.get(&chat.key).await.unwrap().unwrap();
            assert_eq!(stored, chat);
            assert_eq!(repo.list(Platform::Uzum, 10).await.unwrap().len(), 1);
            assert!(repo.list(Platform::Kaspi, 10).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_set_preview() {
        for repo in repos().await {
            let chat = chat();
            repo.upsert(&chat).await.unwrap();

            let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
            repo.set_preview(&chat.key, "Shipped!", at).await.unwrap();

            let stored = repo.get(&chat.key).await.unwrap().unwrap();
            assert_eq!(stored.last_message.as_deref(), Some("Shipped!"));
            assert_eq!(stored.updated_at, at);
        }
    }

    #[tokio::test]
    async fn test_set_preview_on_missing_chat() {
        for repo in repos().await {
            let missing = bazaar_core::keys::chat_key(Platform::Kaspi, "nope");
            let err = repo.set_preview(&missing, "x", Utc::now()).await.unwrap_err();
            assert!(matches!(err, DbError::NotFound { .. }));
        }
    }
}
