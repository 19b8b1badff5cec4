//! # bazaar-sync: Marketplace Sync Engine
//!
//! Keeps the canonical store in step with every configured marketplace:
//! orders and support chats are pulled in, locally written replies are
//! pushed out.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Engine Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncScheduler (one task per platform)           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ every interval                          │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ OrderSyncJob   │  │ ChatSyncJob    │  │ OutboundRelay          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ orders upsert  │  │ chats, history │  │ pending replies ──►    │    │
//! │  │ by canonical   │  │ and preview    │  │ platform, at most      │    │
//! │  │ key            │  │                │  │ batch_size per cycle   │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          └───────────────────┼───────────────────────┘                  │
//! │                              ▼                                          │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ PlatformConnector: Yandex │ Uzum │ Kaspi                         │  │
//! │  │   ApiClient ─► TokenManager ─► signed login                      │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Store access goes through bazaar-db repositories only.                │
//! │  New orders and client messages raise alerts through [`notify`].       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`scheduler`] - Per-platform loops, cycle reports, shutdown
//! - [`jobs`] - Order sync, chat sync, outbound relay
//! - [`connector`] - Marketplace REST adapters
//! - [`auth`] - Cached access tokens with expiry and re-login
//! - [`signing`] - Login request signatures
//! - [`notify`] - New-order and new-message alerts
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bazaar_db::{DbConfig, SqliteStore};
//! use bazaar_sync::{Alerts, SyncConfig, SyncScheduler};
//!
//! let config = SyncConfig::load(None)?;
//! let store = Arc::new(SqliteStore::new(DbConfig::new(&config.database.path)).await?);
//! let alerts = Alerts::from_settings(&config.notify, config.sync.request_timeout())?;
//!
//! let handle = SyncScheduler::from_config(&config, store, alerts).start();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod connector;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod scheduler;
pub mod signing;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{Authenticator, Grant, TokenManager};
pub use config::{PlatformConfig, SyncConfig, SyncSettings};
pub use connector::{build_connector, KaspiConnector, PlatformConnector, UzumConnector, YandexConnector};
pub use error::{SyncError, SyncResult};
pub use jobs::{
    ChatSyncJob, ChatSyncReport, OrderSyncJob, OrderSyncReport, OutboundRelay, RelayReport,
};
pub use notify::{Alerts, Notifier, TelegramNotifier};
pub use scheduler::{CycleReport, PlatformPipeline, PlatformStatus, SchedulerHandle, SyncScheduler};
