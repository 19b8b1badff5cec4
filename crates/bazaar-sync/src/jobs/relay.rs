//! # Outbound Relay
//!
//! Delivers replies written locally (by the dashboard) to their marketplace.
//!
//! ## Relay Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Scan     pending_outbound(platform, batch_size × 10):               │
//! │              never-tried rows first, then previously failed ones        │
//! │  2. Check    text rejected locally → mark_failed, costs no send slot    │
//! │  3. Send     at most batch_size of the rest                             │
//! │                                                                         │
//! │     ok              → mark_delivered(id, platform id | "local-<uuid>")  │
//! │     token rejected  → untouched, retried next cycle                     │
//! │     login failed    → stop the relay for this cycle                     │
//! │     anything else   → mark_failed(id, error), retried next cycle        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A message stays pending until a send succeeds, then is never sent again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bazaar_core::{validation, Chat, Message};
use bazaar_db::{ChatRepository, MessageRepository, RecordStore};

use super::store_call;
use crate::connector::PlatformConnector;
use crate::error::SyncResult;

/// Pending rows scanned per send slot, so rows rejected locally or left
/// without a chat do not use up the scan.
const SCAN_FACTOR: usize = 10;

/// Prefix of the id recorded when a platform does not return one.
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub sent: usize,
    pub failed: usize,
    /// Left pending because the token was rejected.
    pub deferred: usize,
}

pub struct OutboundRelay {
    chats: ChatRepository,
    messages: MessageRepository,
    batch_size: usize,
    store_timeout: Duration,
}

impl OutboundRelay {
    pub fn new(store: Arc<dyn RecordStore>, batch_size: usize, store_timeout: Duration) -> Self {
        OutboundRelay {
            chats: ChatRepository::new(store.clone()),
            messages: MessageRepository::new(store),
            batch_size,
            store_timeout,
        }
    }

    pub async fn run(&self, connector: &dyn PlatformConnector) -> SyncResult<RelayReport> {
        let platform = connector.platform();
        let pending = store_call(
            self.store_timeout,
            "pending scan",
            self.messages.pending_outbound(platform, self.batch_size * SCAN_FACTOR),
        )
        .await?;

        let mut report = RelayReport::default();
        let mut owners: HashMap<String, Option<Chat>> = HashMap::new();
        let mut attempted = 0;

        for message in pending {
            let key = message.chat_key.as_str().to_string();
            if !owners.contains_key(&key) {
                let chat = store_call(self.store_timeout, "chat lookup", self.chats.get(&message.chat_key)).await?;
                owners.insert(key.clone(), chat);
            }
            let Some(Some(chat)) = owners.get(&key) else {
                warn!(message_id = %message.id, chat = %message.chat_key, "Pending message has no chat");
                continue;
            };

            if let Err(e) = validation::validate_outbound_text(platform, &message.text) {
                report.failed += 1;
                warn!(%platform, message_id = %message.id, error = %e, "Outbound text rejected");
                self.annotate(&message.id, &e.to_string()).await;
                continue;
            }

            if attempted == self.batch_size {
                break;
            }
            attempted += 1;
            self.deliver(connector, chat, &message, &mut report).await?;
        }

        if attempted > 0 || report.failed > 0 {
            info!(
                %platform,
                sent = report.sent,
                failed = report.failed,
                deferred = report.deferred,
                "Outbound relay finished"
            );
        }
        Ok(report)
    }

    /// Sends one message. Only a login failure is returned as an error.
    async fn deliver(
        &self,
        connector: &dyn PlatformConnector,
        chat: &Chat,
        message: &Message,
        report: &mut RelayReport,
    ) -> SyncResult<()> {
        let platform = chat.platform;

        match connector.send_message(&chat.external_id, &message.text).await {
            Ok(receipt) => {
                let external_id = receipt
                    .external_id
                    .unwrap_or_else(|| format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()));
                debug!(%platform, message_id = %message.id, external_id = %external_id, "Message delivered");
                report.sent += 1;
                if let Err(e) = store_call(
                    self.store_timeout,
                    "mark delivered",
                    self.messages.mark_delivered(&message.id, &external_id),
                )
                .await
                {
                    // The platform has it; without the id it may be sent again.
                    warn!(%platform, message_id = %message.id, error = %e, "Could not record delivery");
                }
                Ok(())
            }
            Err(e) if e.is_login_failure() => Err(e),
            Err(e) if e.is_auth_rejected() => {
                report.deferred += 1;
                info!(%platform, message_id = %message.id, "Token rejected, message stays pending");
                Ok(())
            }
            Err(e) => {
                report.failed += 1;
                warn!(%platform, message_id = %message.id, error = %e, "Send failed");
                self.annotate(&message.id, &e.to_string()).await;
                Ok(())
            }
        }
    }

    async fn annotate(&self, id: &str, error: &str) {
        if let Err(e) = store_call(self.store_timeout, "mark failed", self.messages.mark_failed(id, error)).await {
            warn!(message_id = %id, error = %e, "Could not annotate failed message");
        }
    }
}
