//! # bazaar-core: Pure Domain Logic for Bazaar Sync
//!
//! This crate holds the canonical shapes every marketplace record is mapped
//! onto, plus the pure rules that perform the mapping. Nothing in here talks
//! to the network or the database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bazaar Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Marketplace APIs (Yandex Market, Uzum, Kaspi)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP (bazaar-sync connectors)         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bazaar-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   keys    │  │ translate │  │ timestamp │  │   │
//! │  │   │   Order   │  │ IdHasher  │  │  status   │  │  formats  │  │   │
//! │  │   │   Chat    │  │ v5 UUIDs  │  │  sender   │  │  → UTC    │  │   │
//! │  │   │  Message  │  │           │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    bazaar-db (Store Layer)                      │   │
//! │  │           RecordStore, SQLite, typed repositories               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Canonical Order / Chat / Message and their remote counterparts
//! - [`keys`] - Deterministic canonical key derivation
//! - [`translate`] - Per-platform status and sender-role tables
//! - [`timestamp`] - Remote date formats normalized to UTC
//! - [`money`] - Integer minor-unit amounts
//! - [`validation`] - Input checks on remote ids and outbound text
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use bazaar_core::{keys, Platform};
//!
//! let a = keys::order_key(Platform::Yandex, "53939895937");
//! let b = keys::order_key(Platform::Yandex, "53939895937");
//! assert_eq!(a, b);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod keys;
pub mod money;
pub mod timestamp;
pub mod translate;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use keys::CanonicalKey;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default polling interval for every platform loop (seconds).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Default number of outbound messages dispatched per platform per cycle.
///
/// Kept small to stay well inside marketplace rate limits.
pub const DEFAULT_OUTBOUND_BATCH_SIZE: usize = 10;

/// Default order lookback window (days).
///
/// Much wider than the sync interval so that a service outage of several
/// days still converges on the next successful cycle.
pub const DEFAULT_ORDER_LOOKBACK_DAYS: i64 = 30;
