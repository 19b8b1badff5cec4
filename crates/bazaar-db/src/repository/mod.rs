//! # Repository Module
//!
//! Typed access to the canonical tables on top of any [`RecordStore`].
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Sync job                                                              │
//! │       │  orders.upsert(&order)                                         │
//! │       ▼                                                                 │
//! │  OrderRepository  ── Order → Record ──►  dyn RecordStore               │
//! │                   ◄─ Record → Order ──   (SqliteStore | MemoryStore)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](orders::OrderRepository) - Order upsert and lookup
//! - [`ChatRepository`](chats::ChatRepository) - Chat upsert and preview
//! - [`MessageRepository`](messages::MessageRepository) - Inbound upsert and
//!   the outbound queue

pub mod chats;
pub mod messages;
pub mod orders;

use chrono::{DateTime, Utc};
use serde_json::Value;

use bazaar_core::timestamp;

use crate::error::{DbError, DbResult};
use crate::store::{Record, Table};

// =============================================================================
// Record Field Helpers
// =============================================================================

pub(crate) fn text(table: Table, record: &Record, column: &str) -> DbResult<String> {
    match record.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(DbError::decode(
            table.name(),
            column,
            format!("expected text, found {:?}", other),
        )),
    }
}

pub(crate) fn opt_text(table: Table, record: &Record, column: &str) -> DbResult<Option<String>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        other => Err(DbError::decode(
            table.name(),
            column,
            format!("expected text or null, found {:?}", other),
        )),
    }
}

pub(crate) fn integer(table: Table, record: &Record, column: &str) -> DbResult<i64> {
    record
        .get(column)
        .and_then(Value::as_i64)
        .ok_or_else(|| DbError::decode(table.name(), column, "expected integer"))
}

pub(crate) fn boolean(table: Table, record: &Record, column: &str) -> DbResult<bool> {
    match record.get(column) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_i64().unwrap_or(0) != 0),
        None | Some(Value::Null) => Ok(false),
        other => Err(DbError::decode(
            table.name(),
            column,
            format!("expected boolean, found {:?}", other),
        )),
    }
}

pub(crate) fn datetime(table: Table, record: &Record, column: &str) -> DbResult<DateTime<Utc>> {
    let raw = text(table, record, column)?;
    timestamp::parse_rfc3339(&raw).map_err(|e| DbError::decode(table.name(), column, e.to_string()))
}

pub(crate) fn parsed<T>(table: Table, record: &Record, column: &str) -> DbResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text(table, record, column)?
        .parse()
        .map_err(|e: T::Err| DbError::decode(table.name(), column, e.to_string()))
}

/// Decodes a JSON column; a missing value yields the type's default.
pub(crate) fn json_column<T>(table: Table, record: &Record, column: &str) -> DbResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match record.get(column) {
        None | Some(Value::Null) => Ok(T::default()),
        // A store that kept the column as text.
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| DbError::decode(table.name(), column, e.to_string())),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| DbError::decode(table.name(), column, e.to_string())),
    }
}
