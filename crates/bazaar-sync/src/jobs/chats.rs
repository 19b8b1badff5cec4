//! # Chat Sync Job
//!
//! For every open conversation on the platform:
//!
//! ```text
//!   (a) upsert chat metadata           platform_chats  ON CONFLICT (id)
//!   (b) fetch full message history
//!   (c) upsert each message            platform_messages ON CONFLICT
//!                                        (chat_id, external_message_id)
//!   (d) set the chat's last-message preview to the newest message seen
//! ```
//!
//! There is no transaction around the steps; each is idempotent, so an
//! interrupted chat converges on the next cycle.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use bazaar_core::{validation, Chat, Message, RemoteChat, Sender};
use bazaar_db::{ChatRepository, MessageRepository, RecordStore};

use super::store_call;
use crate::connector::PlatformConnector;
use crate::error::SyncResult;
use crate::notify::Alerts;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSyncReport {
    pub chats: usize,
    pub chats_failed: usize,
    pub messages_upserted: usize,
    pub messages_failed: usize,
    pub new_client_messages: usize,
}

pub struct ChatSyncJob {
    chats: ChatRepository,
    messages: MessageRepository,
    alerts: Alerts,
    store_timeout: Duration,
}

impl ChatSyncJob {
    pub fn new(store: Arc<dyn RecordStore>, alerts: Alerts, store_timeout: Duration) -> Self {
        ChatSyncJob {
            chats: ChatRepository::new(store.clone()),
            messages: MessageRepository::new(store),
            alerts,
            store_timeout,
        }
    }

    /// Syncs every chat the platform lists.
    ///
    /// A chat whose history cannot be fetched is skipped. A login failure
    /// ends the job, since every later call would fail the same way.
    pub async fn run(&self, connector: &dyn PlatformConnector) -> SyncResult<ChatSyncReport> {
        let platform = connector.platform();
        let remote_chats = connector.fetch_chats().await?;
        let mut report = ChatSyncReport::default();

        for remote in &remote_chats {
            match self.sync_chat(connector, remote, &mut report).await {
                Ok(()) => report.chats += 1,
                Err(e) if e.is_login_failure() => return Err(e),
                Err(e) => {
                    report.chats_failed += 1;
                    warn!(%platform, chat_id = %remote.external_id, error = %e, "Failed to sync chat");
                }
            }
        }

        info!(
            %platform,
            chats = report.chats,
            messages = report.messages_upserted,
            new_client_messages = report.new_client_messages,
            failed = report.chats_failed,
            "Chat sync finished"
        );
        Ok(report)
    }

    async fn sync_chat(
        &self,
        connector: &dyn PlatformConnector,
        remote: &RemoteChat,
        report: &mut ChatSyncReport,
    ) -> SyncResult<()> {
        let platform = connector.platform();
        validation::validate_external_id(&remote.external_id)?;

        let chat = Chat::from_remote(platform, remote, Utc::now());
        store_call(self.store_timeout, "chat upsert", self.chats.upsert(&chat)).await?;

        let history = connector.fetch_messages(&remote.external_id).await?;
        debug!(%platform, chat_id = %remote.external_id, count = history.len(), "Fetched history");

        for entry in &history {
            if let Err(e) = validation::validate_external_id(&entry.external_id) {
                report.messages_failed += 1;
                warn!(%platform, chat_id = %remote.external_id, error = %e, "Skipping message without id");
                continue;
            }

            let message = Message::inbound(&chat, entry);
            let is_new_client_message = entry.sender == Sender::Client
                && !store_call(
                    self.store_timeout,
                    "message lookup",
                    self.messages.exists(&chat.key, &entry.external_id),
                )
                .await?;

            match store_call(self.store_timeout, "message upsert", self.messages.upsert_inbound(&message)).await {
                Ok(()) => {
                    report.messages_upserted += 1;
                    if is_new_client_message {
                        report.new_client_messages += 1;
                        self.alerts.new_client_message(&chat, &message);
                    }
                }
                Err(e) => {
                    report.messages_failed += 1;
                    warn!(
                        %platform,
                        chat_id = %remote.external_id,
                        message_id = %entry.external_id,
                        error = %e,
                        "Failed to store message"
                    );
                }
            }
        }

        // max_by_key keeps the last of equal timestamps, i.e. the later entry
        if let Some(latest) = history.iter().max_by_key(|m| m.created_at) {
            let at = latest.created_at.max(chat.updated_at);
            store_call(
                self.store_timeout,
                "chat preview",
                self.chats.set_preview(&chat.key, &latest.text, at),
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;
    use bazaar_core::{keys, Platform, RemoteMessage};
    use bazaar_db::{MemoryStore, Table};
    use chrono::{DateTime, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, minute, 0).unwrap()
    }

    fn chat(id: &str) -> RemoteChat {
        RemoteChat {
            external_id: id.to_string(),
            client_name: "Aziza".to_string(),
            last_message: None,
            unread_count: 1,
            updated_at: Some(at(0)),
            order_id: None,
        }
    }

    fn message(id: &str, text: &str, sender: Sender, minute: u32) -> RemoteMessage {
        RemoteMessage {
            external_id: id.to_string(),
            text: text.to_string(),
            sender,
            created_at: at(minute),
            is_read: false,
        }
    }

    fn setup() -> (Arc<MemoryStore>, ChatSyncJob, FakeConnector) {
        let store = Arc::new(MemoryStore::new());
        let job = ChatSyncJob::new(store.clone(), Alerts::disabled(), Duration::from_secs(5));
        (store, job, FakeConnector::new(Platform::Uzum))
    }

    #[tokio::test]
    async fn test_messages_upsert_idempotently() {
        let (store, job, connector) = setup();
        *connector.chats.lock().unwrap() = vec![chat("c-1")];
        connector.histories.lock().unwrap().insert(
            "c-1".into(),
            vec![
                message("m-1", "Hi", Sender::Client, 1),
                message("m-2", "Hello!", Sender::Shop, 2),
            ],
        );

        let first = job.run(&connector).await.unwrap();
        assert_eq!(first.messages_upserted, 2);
        assert_eq!(first.new_client_messages, 1);

        let second = job.run(&connector).await.unwrap();
        assert_eq!(second.new_client_messages, 0);
        assert_eq!(store.len(Table::PlatformMessages).await, 2);
        assert_eq!(store.len(Table::PlatformChats).await, 1);
    }

    #[tokio::test]
    async fn test_preview_is_newest_message() {
        let (store, job, connector) = setup();
        *connector.chats.lock().unwrap() = vec![chat("c-1")];
        connector.histories.lock().unwrap().insert(
            "c-1".into(),
            vec![
                message("m-2", "newest", Sender::Client, 9),
                message("m-1", "older", Sender::Client, 3),
            ],
        );

        job.run(&connector).await.unwrap();

        let chats = ChatRepository::new(store);
        let stored = chats.get(&keys::chat_key(Platform::Uzum, "c-1")).await.unwrap().unwrap();
        assert_eq!(stored.last_message.as_deref(), Some("newest"));
        assert_eq!(stored.updated_at, at(9));
    }

    #[tokio::test]
    async fn test_failed_history_skips_only_that_chat() {
        let (store, job, connector) = setup();
        *connector.chats.lock().unwrap() = vec![chat("missing"), chat("c-2")];
        connector
            .histories
            .lock()
            .unwrap()
            .insert("c-2".into(), vec![message("m-1", "Hi", Sender::Client, 1)]);

        let report = job.run(&connector).await.unwrap();
        assert_eq!(report.chats, 1);
        assert_eq!(report.chats_failed, 1);

        let messages = MessageRepository::new(store);
        let key = keys::chat_key(Platform::Uzum, "c-2");
        assert_eq!(messages.count_for_chat(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_failure_ends_job() {
        let (_, job, connector) = setup();
        *connector.fetch_error.lock().unwrap() = Some(|platform| crate::error::SyncError::LoginFailed {
            platform,
            reason: "HTTP 403".into(),
        });

        let err = job.run(&connector).await.unwrap_err();
        assert!(err.is_login_failure());
    }
}
