//! # In-Memory RecordStore
//!
//! Same contract as the SQLite store, held in a `RwLock`ed map. Used by the
//! sync engine's tests and by `--dry-run` style tooling that should not touch
//! a database file. No foreign keys and no CHECK constraints.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::DbResult;
use crate::store::{check_record, Condition, Filter, Record, RecordStore, SortOrder, Table};

/// A [`RecordStore`] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table`.
    pub async fn len(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .get(&table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, table: Table) -> bool {
        self.len(table).await == 0
    }
}

fn matches(record: &Record, filter: &Filter) -> bool {
    filter.conditions().iter().all(|condition| match condition {
        Condition::Eq(column, Value::Null) | Condition::IsNull(column) => {
            record.get(column).map_or(true, Value::is_null)
        }
        Condition::Eq(column, value) => record.get(column) == Some(value),
        Condition::NotNull(column) => record.get(column).is_some_and(|v| !v.is_null()),
    })
}

/// Matches on the conflict key; a NULL or missing key column never matches.
fn collides(existing: &Record, incoming: &Record, conflict_key: &[&str]) -> bool {
    conflict_key.iter().all(|column| {
        match (existing.get(*column), incoming.get(*column)) {
            (Some(a), Some(b)) => !a.is_null() && !b.is_null() && a == b,
            _ => false,
        }
    })
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, table: Table, record: Record, conflict_key: &[&str]) -> DbResult<()> {
        check_record(table, &record, conflict_key)?;

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table).or_default();

        match rows.iter_mut().find(|row| collides(row, &record, conflict_key)) {
            Some(existing) => {
                for (column, value) in record {
                    if column != "id" && !conflict_key.contains(&column.as_str()) {
                        existing.insert(column, value);
                    }
                }
            }
            None => rows.push(record),
        }

        Ok(())
    }

    async fn select(&self, table: Table, filter: &Filter) -> DbResult<Vec<Record>> {
        filter.check(table)?;

        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| matches(r, filter)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, order)) = filter.ordering() {
            // Stable sort keeps insertion order among equal keys.
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
            if order == SortOrder::Desc {
                // Match SQLite's `rowid DESC` tie-break.
                let mut start = 0;
                while start < rows.len() {
                    let mut end = start + 1;
                    while end < rows.len()
                        && compare(rows[start].get(column), rows[end].get(column)) == Ordering::Equal
                    {
                        end += 1;
                    }
                    rows[start..end].reverse();
                    start = end;
                }
            }
        }
        if let Some(limit) = filter.max_rows() {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn update(&self, table: Table, patch: Record, filter: &Filter) -> DbResult<u64> {
        for column in patch.keys() {
            table.check_column(column)?;
        }
        filter.check(table)?;

        let mut tables = self.tables.write().await;
        let mut touched = 0;
        if let Some(rows) = tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| matches(r, filter)) {
                for (column, value) in &patch {
                    row.insert(column.clone(), value.clone());
                }
                touched += 1;
            }
        }

        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: &str, external: Value, created_at: &str) -> Record {
        match json!({
            "id": id,
            "chat_id": "c1",
            "external_message_id": external,
            "text": id,
            "sender": "shop",
            "created_at": created_at,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_conflict_key() {
        let store = MemoryStore::new();
        let key = Table::PlatformMessages.conflict_key();

        store
            .upsert(Table::PlatformMessages, message("a", json!("x"), "1"), key)
            .await
            .unwrap();
        store
            .upsert(Table::PlatformMessages, message("b", json!("x"), "2"), key)
            .await
            .unwrap();

        let rows = store
            .select(Table::PlatformMessages, &Filter::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("a"));
        assert_eq!(rows[0]["created_at"], json!("2"));
    }

    #[tokio::test]
    async fn test_null_keys_never_collide() {
        let store = MemoryStore::new();
        let key = Table::PlatformMessages.conflict_key();
        for id in ["p1", "p2", "p3"] {
            store
                .upsert(Table::PlatformMessages, message(id, Value::Null, "1"), key)
                .await
                .unwrap();
        }
        assert_eq!(store.len(Table::PlatformMessages).await, 3);
    }

    #[tokio::test]
    async fn test_select_orders_and_limits() {
        let store = MemoryStore::new();
        let key = Table::PlatformMessages.conflict_key();
        for (id, at) in [("m3", "3"), ("m1", "1"), ("m2", "2")] {
            store
                .upsert(Table::PlatformMessages, message(id, json!(id), at), key)
                .await
                .unwrap();
        }

        let oldest_two = store
            .select(
                Table::PlatformMessages,
                &Filter::new().order_by("created_at", SortOrder::Asc).limit(2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = oldest_two.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("m1"), json!("m2")]);
    }

    #[tokio::test]
    async fn test_update_counts_rows() {
        let store = MemoryStore::new();
        let key = Table::PlatformMessages.conflict_key();
        store
            .upsert(Table::PlatformMessages, message("p1", Value::Null, "1"), key)
            .await
            .unwrap();
        store
            .upsert(Table::PlatformMessages, message("s1", json!("x"), "1"), key)
            .await
            .unwrap();

        let mut patch = Record::new();
        patch.insert("send_error".into(), json!("boom"));
        let touched = store
            .update(
                Table::PlatformMessages,
                patch,
                &Filter::new().is_null("external_message_id"),
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);
    }
}
