//! # bazaar-db: Store Layer for Bazaar Sync
//!
//! The canonical store the sync engine writes into, behind a record-oriented
//! interface ([`RecordStore`]) so the engine never depends on a particular
//! database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bazaar Data Flow                                 │
//! │                                                                         │
//! │  OrderSyncJob / ChatSyncJob / OutboundRelay (bazaar-sync)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bazaar-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ Repositories  │    │  RecordStore  │    │  Migrations  │  │   │
//! │  │   │               │    │   (store.rs)  │    │  (embedded)  │  │   │
//! │  │   │ OrderRepo     │───►│               │    │              │  │   │
//! │  │   │ ChatRepo      │    │ SqliteStore   │    │ 001_init.sql │  │   │
//! │  │   │ MessageRepo   │    │ MemoryStore   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite database   (orders, platform_chats, platform_messages) │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - `RecordStore` trait, tables, filters
//! - [`pool`] - SQLite connection pool creation and configuration
//! - [`sqlite`] - `RecordStore` over SQLite
//! - [`memory`] - `RecordStore` in process memory
//! - [`migrations`] - Embedded database migrations
//! - [`repository`] - Order, chat and message repositories
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bazaar_db::{DbConfig, OrderRepository, RecordStore, SqliteStore};
//!
//! let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(DbConfig::new("bazaar.db")).await?);
//! let orders = OrderRepository::new(store.clone());
//! orders.upsert(&order).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod sqlite;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{DbConfig, SqliteStore};
pub use store::{Filter, Record, RecordStore, SortOrder, Table};

// Repository re-exports for convenience
pub use repository::chats::ChatRepository;
pub use repository::messages::MessageRepository;
pub use repository::orders::OrderRepository;
