//! # Sync Scheduler
//!
//! Drives one pipeline per configured platform on its own interval.
//!
//! ## Task Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncScheduler                                  │
//! │                                                                         │
//! │   ┌───────────────┐    ┌───────────────┐    ┌───────────────┐          │
//! │   │ task: yandex  │    │ task: uzum    │    │ task: kaspi   │          │
//! │   │               │    │               │    │               │          │
//! │   │ tick ─► cycle │    │ tick ─► cycle │    │ tick ─► cycle │          │
//! │   └───────┬───────┘    └───────┬───────┘    └───────┬───────┘          │
//! │           │                    │                    │                   │
//! │           ▼                    ▼                    ▼                   │
//! │   ┌─────────────────────────────────────────────────────────────────┐  │
//! │   │          status: HashMap<Platform, PlatformStatus>              │  │
//! │   └─────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │   cycle = OrderSyncJob ─► ChatSyncJob ─► OutboundRelay                 │
//! │                                                                         │
//! │   • a platform's cycles never overlap; a long cycle delays the next    │
//! │   • a failing platform never stalls the others                         │
//! │   • shutdown lets a running cycle finish, then stops the task          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use bazaar_core::Platform;
use bazaar_db::RecordStore;

use crate::config::{SyncConfig, SyncSettings};
use crate::connector::{build_connector, PlatformConnector};
use crate::jobs::{
    ChatSyncJob, ChatSyncReport, OrderSyncJob, OrderSyncReport, OutboundRelay, RelayReport,
};
use crate::notify::Alerts;

// =============================================================================
// Cycle Reports
// =============================================================================

/// Outcome of one platform cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub platform: Platform,
    pub orders: Option<OrderSyncReport>,
    pub chats: Option<ChatSyncReport>,
    pub relay: Option<RelayReport>,
    /// Job-level failures, in the order they happened.
    pub errors: Vec<String>,
    /// True when a login failure cut the cycle short.
    pub skipped: bool,
}

impl CycleReport {
    fn new(platform: Platform) -> Self {
        CycleReport {
            platform,
            orders: None,
            chats: None,
            relay: None,
            errors: Vec::new(),
            skipped: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Latest known state of one platform's loop.
#[derive(Debug, Clone, Default)]
pub struct PlatformStatus {
    pub cycles: u64,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

type StatusMap = Arc<RwLock<HashMap<Platform, PlatformStatus>>>;

// =============================================================================
// Platform Pipeline
// =============================================================================

/// The three jobs bound to one connector.
pub struct PlatformPipeline {
    connector: Arc<dyn PlatformConnector>,
    orders: OrderSyncJob,
    chats: ChatSyncJob,
    relay: OutboundRelay,
    interval: Duration,
}

impl PlatformPipeline {
    pub fn new(
        connector: Arc<dyn PlatformConnector>,
        store: Arc<dyn RecordStore>,
        alerts: Alerts,
        settings: &SyncSettings,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        let store_timeout = settings.store_timeout();
        PlatformPipeline {
            orders: OrderSyncJob::new(
                store.clone(),
                alerts.clone(),
                settings.order_lookback_days,
                store_timeout,
            ),
            chats: ChatSyncJob::new(store.clone(), alerts, store_timeout),
            relay: OutboundRelay::new(store, batch_size, store_timeout),
            connector,
            interval,
        }
    }

    pub fn platform(&self) -> Platform {
        self.connector.platform()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs orders, chats and the relay once, in that order.
    ///
    /// A job error is recorded and the next job still runs, except for a
    /// login failure, which ends the cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let platform = self.platform();
        let connector = self.connector.as_ref();
        let mut report = CycleReport::new(platform);
        debug!(%platform, "Cycle started");

        match self.orders.run(connector).await {
            Ok(r) => report.orders = Some(r),
            Err(e) => {
                warn!(%platform, error = %e, "Order sync failed");
                report.errors.push(format!("orders: {}", e));
                if e.is_login_failure() {
                    report.skipped = true;
                    return report;
                }
            }
        }

        match self.chats.run(connector).await {
            Ok(r) => report.chats = Some(r),
            Err(e) => {
                warn!(%platform, error = %e, "Chat sync failed");
                report.errors.push(format!("chats: {}", e));
                if e.is_login_failure() {
                    report.skipped = true;
                    return report;
                }
            }
        }

        match self.relay.run(connector).await {
            Ok(r) => report.relay = Some(r),
            Err(e) => {
                warn!(%platform, error = %e, "Outbound relay failed");
                report.errors.push(format!("relay: {}", e));
                report.skipped = e.is_login_failure();
            }
        }

        report
    }
}

// =============================================================================
// Scheduler
// =============================================================================

#[derive(Default)]
pub struct SyncScheduler {
    pipelines: Vec<Arc<PlatformPipeline>>,
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pipeline: PlatformPipeline) {
        self.pipelines.push(Arc::new(pipeline));
    }

    /// One pipeline per runnable platform in `config`.
    ///
    /// A platform whose connector cannot be built is logged and left out.
    pub fn from_config(config: &SyncConfig, store: Arc<dyn RecordStore>, alerts: Alerts) -> Self {
        let mut scheduler = Self::new();
        for (platform, section) in config.runnable_platforms() {
            match build_connector(platform, &section, &config.sync) {
                Ok(connector) => {
                    let interval = config.interval_for(platform);
                    info!(%platform, interval_secs = interval.as_secs(), "Platform configured");
                    scheduler.add(PlatformPipeline::new(
                        connector,
                        store.clone(),
                        alerts.clone(),
                        &config.sync,
                        config.batch_size_for(platform),
                        interval,
                    ));
                }
                Err(e) => error!(%platform, error = %e, "Failed to build connector"),
            }
        }
        scheduler
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.pipelines.iter().map(|p| p.platform()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Runs one cycle of every platform concurrently.
    pub async fn run_once(&self) -> Vec<CycleReport> {
        join_all(self.pipelines.iter().map(|p| p.run_cycle())).await
    }

    /// Spawns one loop per platform.
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status: StatusMap = Arc::new(RwLock::new(HashMap::new()));

        let tasks = self
            .pipelines
            .iter()
            .map(|pipeline| {
                tokio::spawn(platform_loop(
                    pipeline.clone(),
                    status.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(platforms = self.pipelines.len(), "Scheduler started");
        SchedulerHandle {
            shutdown_tx,
            tasks,
            status,
        }
    }
}

async fn platform_loop(
    pipeline: Arc<PlatformPipeline>,
    status: StatusMap,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let platform = pipeline.platform();
    let mut ticker = tokio::time::interval(pipeline.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let report = pipeline.run_cycle().await;
                let mut map = status.write().await;
                let entry = map.entry(platform).or_default();
                entry.cycles += 1;
                entry.last_cycle_at = Some(Utc::now());
                if let Some(last) = report.errors.last() {
                    entry.last_error = Some(last.clone());
                }
                entry.last_report = Some(report);
            }
        }
    }

    info!(%platform, "Platform loop stopped");
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    status: StatusMap,
}

impl SchedulerHandle {
    pub async fn status(&self, platform: Platform) -> Option<PlatformStatus> {
        self.status.read().await.get(&platform).cloned()
    }

    pub async fn statuses(&self) -> HashMap<Platform, PlatformStatus> {
        self.status.read().await.clone()
    }

    /// Signals every loop and waits for running cycles to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Platform loop panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::testing::FakeConnector;
    use bazaar_core::{Money, RemoteOrder};
    use bazaar_db::{MemoryStore, MessageRepository, Table};

    fn order(id: &str) -> RemoteOrder {
        RemoteOrder {
            external_id: id.to_string(),
            status_code: "PROCESSING".to_string(),
            amount: Money::from_major(10),
            product_name: "Kettle".to_string(),
            customer_name: None,
            created_at: None,
        }
    }

    fn pipeline(connector: Arc<FakeConnector>, store: Arc<MemoryStore>, interval_secs: u64) -> PlatformPipeline {
        PlatformPipeline::new(
            connector,
            store,
            Alerts::disabled(),
            &SyncSettings::default(),
            10,
            Duration::from_secs(interval_secs),
        )
    }

    fn login_failure(platform: Platform) -> SyncError {
        SyncError::LoginFailed {
            platform,
            reason: "HTTP 403".into(),
        }
    }

    #[tokio::test]
    async fn test_cycle_runs_jobs_in_order() {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(FakeConnector::new(Platform::Uzum));
        *connector.orders.lock().unwrap() = vec![order("1")];

        let report = pipeline(connector.clone(), store.clone(), 60).run_cycle().await;

        assert!(report.is_clean());
        assert_eq!(report.orders.unwrap().created, 1);
        assert!(report.chats.is_some());
        assert!(report.relay.is_some());
        assert_eq!(connector.calls(), vec!["fetch_orders", "fetch_chats"]);
        assert_eq!(store.len(Table::Orders).await, 1);
    }

    #[tokio::test]
    async fn test_login_failure_skips_rest_of_cycle() {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(FakeConnector::new(Platform::Yandex));
        *connector.fetch_error.lock().unwrap() = Some(login_failure);

        let report = pipeline(connector.clone(), store, 60).run_cycle().await;

        assert!(report.skipped);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(connector.calls(), vec!["fetch_orders"]);
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_skip_later_jobs() {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(FakeConnector::new(Platform::Kaspi));
        *connector.fetch_error.lock().unwrap() = Some(|_| SyncError::Timeout("GET orders".into()));

        let report = pipeline(connector.clone(), store, 60).run_cycle().await;

        assert!(!report.skipped);
        assert_eq!(report.errors.len(), 2);
        assert!(report.relay.is_some());
    }

    #[tokio::test]
    async fn test_run_once_isolates_platforms() {
        let store = Arc::new(MemoryStore::new());
        let broken = Arc::new(FakeConnector::new(Platform::Yandex));
        *broken.fetch_error.lock().unwrap() = Some(login_failure);
        let healthy = Arc::new(FakeConnector::new(Platform::Uzum));
        *healthy.orders.lock().unwrap() = vec![order("u-1")];

        let mut scheduler = SyncScheduler::new();
        scheduler.add(pipeline(broken, store.clone(), 60));
        scheduler.add(pipeline(healthy, store.clone(), 60));
        assert_eq!(scheduler.platforms(), vec![Platform::Yandex, Platform::Uzum]);

        let reports = scheduler.run_once().await;
        assert!(reports[0].skipped);
        assert!(reports[1].is_clean());
        assert_eq!(store.len(Table::Orders).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_tick_on_interval_and_stop() {
        let store = Arc::new(MemoryStore::new());
        let fast = Arc::new(FakeConnector::new(Platform::Uzum));
        let slow = Arc::new(FakeConnector::new(Platform::Kaspi));

        let mut scheduler = SyncScheduler::new();
        scheduler.add(pipeline(fast, store.clone(), 60));
        scheduler.add(pipeline(slow, store, 300));
        let handle = scheduler.start();

        // first tick is immediate, then every interval
        tokio::time::sleep(Duration::from_secs(130)).await;

        assert_eq!(handle.status(Platform::Uzum).await.unwrap().cycles, 3);
        assert_eq!(handle.status(Platform::Kaspi).await.unwrap().cycles, 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_platform_keeps_others_running() {
        let store = Arc::new(MemoryStore::new());
        let broken = Arc::new(FakeConnector::new(Platform::Yandex));
        *broken.fetch_error.lock().unwrap() = Some(login_failure);
        let healthy = Arc::new(FakeConnector::new(Platform::Uzum));

        let mut scheduler = SyncScheduler::new();
        scheduler.add(pipeline(broken, store.clone(), 60));
        scheduler.add(pipeline(healthy.clone(), store.clone(), 60));
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        *healthy.orders.lock().unwrap() = vec![order("late")];
        tokio::time::sleep(Duration::from_secs(60)).await;

        let yandex = handle.status(Platform::Yandex).await.unwrap();
        assert_eq!(yandex.cycles, 2);
        assert!(yandex.last_error.unwrap().contains("login"));
        let uzum = handle.status(Platform::Uzum).await.unwrap();
        assert!(uzum.last_report.unwrap().is_clean());
        assert_eq!(store.len(Table::Orders).await, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_reply_is_relayed_by_running_loop() {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(FakeConnector::new(Platform::Uzum));
        *connector.chats.lock().unwrap() = vec![bazaar_core::RemoteChat {
            external_id: "c-1".into(),
            client_name: "Buyer".into(),
            last_message: None,
            unread_count: 0,
            updated_at: None,
            order_id: None,
        }];
        connector.histories.lock().unwrap().insert("c-1".into(), Vec::new());

        let mut scheduler = SyncScheduler::new();
        scheduler.add(pipeline(connector.clone(), store.clone(), 60));
        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let messages = MessageRepository::new(store);
        let key = bazaar_core::keys::chat_key(Platform::Uzum, "c-1");
        messages.queue_outbound(&key, "On its way").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.sent().len(), 1);
        assert!(messages.pending_outbound(Platform::Uzum, 10).await.unwrap().is_empty());
        handle.shutdown().await;
    }
}
