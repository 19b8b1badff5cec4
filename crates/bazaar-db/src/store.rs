//! # Record Store Interface
//!
//! The generic CRUD surface the sync engine writes through. Records are flat
//! JSON objects; each table carries a fixed column whitelist, which is what
//! lets the SQLite implementation build SQL at runtime without ever splicing
//! caller-supplied identifiers.
//!
//! ## Tables
//! ```text
//! ┌──────────────────────┬────────────────────────────────┬──────────────────┐
//! │ Table                │ Conflict key (upsert)          │ JSON / bool cols │
//! ├──────────────────────┼────────────────────────────────┼──────────────────┤
//! │ orders               │ id                             │ metadata         │
//! │ platform_chats       │ id                             │ metadata         │
//! │ platform_messages    │ chat_id, external_message_id   │ is_read, is_sent │
//! └──────────────────────┴────────────────────────────────┴──────────────────┘
//! ```
//!
//! ## Upsert Semantics
//! - A row matches on the conflict key only when every key column is
//!   non-NULL and equal. A NULL in any key column never matches, so pending
//!   messages (`external_message_id IS NULL`) always insert.
//! - On a match, every supplied column except the conflict key and `id` is
//!   overwritten. A row's `id` never changes after insert.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{DbError, DbResult};

/// A single row, keyed by column name.
pub type Record = Map<String, Value>;

// =============================================================================
// Tables
// =============================================================================

/// The tables of the canonical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Orders,
    PlatformChats,
    PlatformMessages,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Orders, Table::PlatformChats, Table::PlatformMessages];

    pub const fn name(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::PlatformChats => "platform_chats",
            Table::PlatformMessages => "platform_messages",
        }
    }

    /// Every column a record for this table may carry.
    pub const fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Orders => &[
                "id",
                "external_id",
                "platform",
                "status",
                "amount_cents",
                "product_name",
                "created_at",
                "synced_at",
                "metadata",
            ],
            Table::PlatformChats => &[
                "id",
                "platform",
                "external_id",
                "client_name",
                "last_message",
                "unread_count",
                "updated_at",
                "metadata",
            ],
            Table::PlatformMessages => &[
                "id",
                "chat_id",
                "platform",
                "external_message_id",
                "text",
                "sender",
                "created_at",
                "is_read",
                "is_sent",
                "send_error",
            ],
        }
    }

    /// Columns holding a serialized JSON object.
    pub const fn json_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Orders | Table::PlatformChats => &["metadata"],
            Table::PlatformMessages => &[],
        }
    }

    /// Columns stored as 0/1 but read back as JSON booleans.
    pub const fn bool_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Orders | Table::PlatformChats => &[],
            Table::PlatformMessages => &["is_read", "is_sent"],
        }
    }

    /// The conflict key the sync engine upserts on.
    pub const fn conflict_key(&self) -> &'static [&'static str] {
        match self {
            Table::Orders | Table::PlatformChats => &["id"],
            Table::PlatformMessages => &["chat_id", "external_message_id"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Rejects any column outside the whitelist.
    pub fn check_column(&self, column: &str) -> DbResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(DbError::UnknownColumn {
                table: self.name().to_string(),
                column: column.to_string(),
            })
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Filter
// =============================================================================

/// One predicate of a [`Filter`]. Predicates are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _) | Condition::IsNull(c) | Condition::NotNull(c) => c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Row selection for `select` and `update`.
///
/// ## Example
/// ```rust
/// use bazaar_db::store::{Filter, SortOrder};
///
/// let pending = Filter::new()
///     .eq("sender", "shop")
///     .is_null("external_message_id")
///     .order_by("created_at", SortOrder::Asc)
///     .limit(100);
/// assert_eq!(pending.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    order_by: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Filter {
    /// A filter matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::IsNull(column.into()));
        self
    }

    pub fn not_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::NotNull(column.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order_by.as_ref().map(|(c, o)| (c.as_str(), *o))
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Validates every referenced column against the table whitelist.
    pub fn check(&self, table: Table) -> DbResult<()> {
        for condition in &self.conditions {
            table.check_column(condition.column())?;
        }
        if let Some((column, _)) = &self.order_by {
            table.check_column(column)?;
        }
        Ok(())
    }
}

/// Validates the columns of a record and a conflict key.
pub(crate) fn check_record(table: Table, record: &Record, conflict_key: &[&str]) -> DbResult<()> {
    if record.is_empty() {
        return Err(DbError::QueryFailed(format!("empty record for {}", table)));
    }
    for column in record.keys() {
        table.check_column(column)?;
    }
    for column in conflict_key {
        table.check_column(column)?;
    }
    Ok(())
}

// =============================================================================
// RecordStore
// =============================================================================

/// The record-oriented store.
///
/// Implementations must be safe to share across the per-platform loops;
/// "last write wins" per conflict key is the only consistency guarantee.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts `record`, or overwrites the row it collides with on
    /// `conflict_key`.
    async fn upsert(&self, table: Table, record: Record, conflict_key: &[&str]) -> DbResult<()>;

    /// Returns the rows matching `filter`.
    async fn select(&self, table: Table, filter: &Filter) -> DbResult<Vec<Record>>;

    /// Applies `patch` to every row matching `filter`; returns the row count.
    async fn update(&self, table: Table, patch: Record, filter: &Filter) -> DbResult<u64>;
}
