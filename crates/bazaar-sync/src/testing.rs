//! In-process connector for job and scheduler tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bazaar_core::{DeliveryReceipt, Platform, RemoteChat, RemoteMessage, RemoteOrder};

use crate::connector::PlatformConnector;
use crate::error::{SyncError, SyncResult};

/// Scripted connector: serves canned listings and records sends.
pub(crate) struct FakeConnector {
    platform: Platform,
    pub orders: Mutex<Vec<RemoteOrder>>,
    pub chats: Mutex<Vec<RemoteChat>>,
    pub histories: Mutex<HashMap<String, Vec<RemoteMessage>>>,
    /// Results handed out by `send_message` in order; an empty queue echoes
    /// a generated id.
    pub send_results: Mutex<VecDeque<SyncResult<DeliveryReceipt>>>,
    pub sent: Mutex<Vec<(String, String)>>,
    /// Error returned by every fetch when set.
    pub fetch_error: Mutex<Option<fn(Platform) -> SyncError>>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeConnector {
    pub fn new(platform: Platform) -> Self {
        FakeConnector {
            platform,
            orders: Mutex::new(Vec::new()),
            chats: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            send_results: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            fetch_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> SyncResult<()> {
        self.calls.lock().unwrap().push(call);
        match *self.fetch_error.lock().unwrap() {
            Some(make) => Err(make(self.platform)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_orders(&self, _since: DateTime<Utc>) -> SyncResult<Vec<RemoteOrder>> {
        self.record("fetch_orders")?;
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn fetch_chats(&self) -> SyncResult<Vec<RemoteChat>> {
        self.record("fetch_chats")?;
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn fetch_messages(&self, chat_external_id: &str) -> SyncResult<Vec<RemoteMessage>> {
        self.record("fetch_messages")?;
        self.histories
            .lock()
            .unwrap()
            .get(chat_external_id)
            .cloned()
            .ok_or_else(|| SyncError::HttpStatus {
                status: 404,
                body: format!("no chat {}", chat_external_id),
            })
    }

    async fn send_message(&self, chat_external_id: &str, text: &str) -> SyncResult<DeliveryReceipt> {
        self.calls.lock().unwrap().push("send_message");
        let scripted = self.send_results.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| {
            let n = self.sent.lock().unwrap().len() + 1;
            Ok(DeliveryReceipt {
                external_id: Some(format!("sent-{}", n)),
            })
        });
        if result.is_ok() {
            self.sent
                .lock()
                .unwrap()
                .push((chat_external_id.to_string(), text.to_string()));
        }
        result
    }
}
