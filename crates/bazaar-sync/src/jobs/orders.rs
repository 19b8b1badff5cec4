//! # Order Sync Job
//!
//! Pulls a bounded lookback window of orders and upserts each one under its
//! canonical key. The remote platform is authoritative; re-running the job
//! over the same input leaves the store unchanged.
//!
//! When the platform omits an order's creation time, the first observation
//! is kept. The first successful pull is a backfill of the whole window: it
//! only alerts for orders the platform dates within the last
//! [`BACKFILL_ALERT_HOURS`].

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use bazaar_core::{translate, validation, Order, Platform, RemoteOrder};
use bazaar_db::{OrderRepository, RecordStore};

use super::store_call;
use crate::connector::PlatformConnector;
use crate::error::SyncResult;
use crate::notify::Alerts;

/// Outcome of one order pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSyncReport {
    pub fetched: usize,
    pub upserted: usize,
    /// Orders seen for the first time.
    pub created: usize,
    pub failed: usize,
}

/// Age up to which an order found by the first pull still raises an alert.
pub const BACKFILL_ALERT_HOURS: i64 = 24;

pub struct OrderSyncJob {
    orders: OrderRepository,
    alerts: Alerts,
    lookback: chrono::Duration,
    store_timeout: Duration,
    backfilled: AtomicBool,
}

impl OrderSyncJob {
    pub fn new(
        store: Arc<dyn RecordStore>,
        alerts: Alerts,
        lookback_days: i64,
        store_timeout: Duration,
    ) -> Self {
        OrderSyncJob {
            orders: OrderRepository::new(store),
            alerts,
            lookback: chrono::Duration::days(lookback_days),
            store_timeout,
            backfilled: AtomicBool::new(false),
        }
    }

    /// Runs one pull.
    ///
    /// A failed fetch is returned to the caller; a failure on a single
    /// order is logged with its id and the rest of the batch continues.
    pub async fn run(&self, connector: &dyn PlatformConnector) -> SyncResult<OrderSyncReport> {
        let platform = connector.platform();
        let now = Utc::now();
        let remote = connector.fetch_orders(now - self.lookback).await?;
        let backfill = !self.backfilled.swap(true, Ordering::Relaxed);

        let mut report = OrderSyncReport {
            fetched: remote.len(),
            ..OrderSyncReport::default()
        };

        for order in &remote {
            match self.sync_one(platform, order, now, backfill).await {
                Ok(created) => {
                    report.upserted += 1;
                    if created {
                        report.created += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        %platform,
                        order_id = %order.external_id,
                        error = %e,
                        "Failed to sync order"
                    );
                }
            }
        }

        info!(
            %platform,
            fetched = report.fetched,
            created = report.created,
            failed = report.failed,
            "Order sync finished"
        );
        Ok(report)
    }

    /// Upserts one order; returns whether it was new.
    async fn sync_one(
        &self,
        platform: Platform,
        remote: &RemoteOrder,
        now: DateTime<Utc>,
        backfill: bool,
    ) -> SyncResult<bool> {
        validation::validate_external_id(&remote.external_id)?;

        if translate::lookup_order_status(platform, &remote.status_code).is_none() {
            warn!(
                %platform,
                order_id = %remote.external_id,
                status = %remote.status_code,
                "Unknown order status, treating as processing"
            );
        }

        let mut order = Order::from_remote(platform, remote, now);
        let stored = store_call(self.store_timeout, "order lookup", self.orders.get(&order.key)).await?;
        if let (Some(stored), None) = (&stored, remote.created_at) {
            order.created_at = stored.created_at;
        }
        store_call(self.store_timeout, "order upsert", self.orders.upsert(&order)).await?;

        let created = stored.is_none();
        if created {
            debug!(%platform, order_id = %order.external_id, key = %order.key, "New order");
            let recent = remote
                .created_at
                .is_some_and(|at| now - at <= chrono::Duration::hours(BACKFILL_ALERT_HOURS));
            if !backfill || recent {
                self.alerts.new_order(&order);
            }
        }
        Ok(created)
    }
}
