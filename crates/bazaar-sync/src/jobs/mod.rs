//! # Sync Jobs
//!
//! The three jobs a platform cycle runs, in order:
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ OrderSyncJob │ ──► │ ChatSyncJob  │ ──► │OutboundRelay │
//! │ pull orders  │     │ pull chats + │     │ push pending │
//! │ upsert by key│     │ histories    │     │ shop replies │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Jobs are generic over [`PlatformConnector`](crate::connector::PlatformConnector)
//! and talk to the store only through the repositories. Every store call is
//! bounded by the configured store timeout.

use std::future::Future;
use std::time::Duration;

use bazaar_db::DbResult;

use crate::error::{SyncError, SyncResult};

pub mod chats;
pub mod orders;
pub mod relay;

pub use chats::{ChatSyncJob, ChatSyncReport};
pub use orders::{OrderSyncJob, OrderSyncReport};
pub use relay::{OutboundRelay, RelayReport};

/// Runs one store call under a deadline.
pub(crate) async fn store_call<T>(
    limit: Duration,
    what: &'static str,
    call: impl Future<Output = DbResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SyncError::Timeout(format!(
            "store {} exceeded {}s",
            what,
            limit.as_secs()
        ))),
    }
}
