//! # Notifications
//!
//! Fire-and-forget alerts for new orders and new buyer messages. A failed
//! alert is logged and forgotten; it never fails a sync job.
//!
//! ```text
//!   OrderSyncJob ──┐
//!                  ├──► Alerts ──spawn──► Notifier::notify(user, text) × N
//!   ChatSyncJob ───┘                      (TelegramNotifier | NoOpNotifier)
//! ```

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use bazaar_core::{Chat, Message, Order};

use crate::config::NotifySettings;
use crate::error::{SyncError, SyncResult};

/// Delivers a short text to one user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i64, text: &str) -> SyncResult<()>;
}

/// Discards every alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(&self, _user_id: i64, _text: &str) -> SyncResult<()> {
        Ok(())
    }
}

// =============================================================================
// Telegram
// =============================================================================

/// Posts alerts through the Telegram Bot API `sendMessage` method.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    endpoint: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, bot_token: &str, timeout: Duration) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(TelegramNotifier {
            http,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_url.trim_end_matches('/'),
                bot_token
            ),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: i64, text: &str) -> SyncResult<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "chat_id": user_id, "text": text }))
            .send()
            .await
            // The endpoint carries the bot token.
            .map_err(|e| SyncError::from(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Alerts
// =============================================================================

/// Fans alerts out to every configured recipient on a background task.
#[derive(Clone)]
pub struct Alerts {
    notifier: Arc<dyn Notifier>,
    recipients: Arc<Vec<i64>>,
}

impl Alerts {
    pub fn new(notifier: Arc<dyn Notifier>, recipients: Vec<i64>) -> Self {
        Alerts {
            notifier,
            recipients: Arc::new(recipients),
        }
    }

    /// Alerts that go nowhere.
    pub fn disabled() -> Self {
        Alerts::new(Arc::new(NoOpNotifier), Vec::new())
    }

    /// Builds alerts from the `[notify]` section.
    pub fn from_settings(settings: &NotifySettings, timeout: Duration) -> SyncResult<Self> {
        match settings.bot_token.as_deref() {
            Some(token) if settings.is_enabled() => {
                let telegram = TelegramNotifier::new(&settings.api_url, token, timeout)?;
                Ok(Alerts::new(Arc::new(telegram), settings.user_ids.clone()))
            }
            _ => Ok(Alerts::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.recipients.is_empty()
    }

    pub fn new_order(&self, order: &Order) {
        let text = format!(
            "New {} order {}\n{}\n{} ({})",
            order.platform, order.external_id, order.product_name, order.amount, order.status
        );
        self.send(text);
    }

    pub fn new_client_message(&self, chat: &Chat, message: &Message) {
        let text = format!(
            "New {} message from {}\n{}",
            chat.platform, chat.client_name, message.text
        );
        self.send(text);
    }

    /// Spawns delivery and returns immediately.
    pub fn send(&self, text: String) {
        if !self.is_enabled() {
            return;
        }
        let notifier = self.notifier.clone();
        let recipients = self.recipients.clone();
        tokio::spawn(async move {
            for &user_id in recipients.iter() {
                match notifier.notify(user_id, &text).await {
                    Ok(()) => debug!(user_id, "Alert delivered"),
                    Err(e) => warn!(user_id, error = %e, "Alert delivery failed"),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ChannelNotifier(mpsc::UnboundedSender<(i64, String)>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, user_id: i64, text: &str) -> SyncResult<()> {
            let _ = self.0.send((user_id, text.to_string()));
            if user_id == 1 {
                return Err(SyncError::ConnectionFailed("offline".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_alerts_reach_every_recipient_despite_failures() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alerts = Alerts::new(Arc::new(ChannelNotifier(tx)), vec![1, 2]);

        alerts.send("hello".to_string());

        assert_eq!(rx.recv().await.unwrap(), (1, "hello".to_string()));
        assert_eq!(rx.recv().await.unwrap(), (2, "hello".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_alerts() {
        let settings = NotifySettings {
            bot_token: None,
            user_ids: vec![1],
            ..NotifySettings::default()
        };
        let alerts = Alerts::from_settings(&settings, Duration::from_secs(5)).unwrap();
        assert!(!alerts.is_enabled());
        alerts.send("dropped".to_string());
    }

    #[tokio::test]
    async fn test_telegram_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({ "chat_id": 42, "text": "New order" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let telegram = TelegramNotifier::new(&server.uri(), "123:abc", Duration::from_secs(5)).unwrap();
        telegram.notify(42, "New order").await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_hides_bot_token() {
        let telegram =
            TelegramNotifier::new("http://127.0.0.1:1", "123:very-secret", Duration::from_secs(1)).unwrap();
        let err = telegram.notify(42, "x").await.unwrap_err();
        assert!(!err.to_string().contains("very-secret"), "{}", err);
    }

    #[tokio::test]
    async fn test_telegram_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bot was blocked"))
            .mount(&server)
            .await;

        let telegram = TelegramNotifier::new(&server.uri(), "t", Duration::from_secs(5)).unwrap();
        let err = telegram.notify(42, "x").await.unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 403, .. }));
    }
}
