//! # SQLite RecordStore
//!
//! Runtime-built SQL over the column whitelist in [`Table`]. Identifiers in
//! the generated SQL only ever come from that whitelist; every value is a
//! bound parameter.
//!
//! ```text
//! upsert  INSERT INTO t (c..) VALUES (?..)
//!         ON CONFLICT (k..) DO UPDATE SET c = excluded.c   -- c ∉ k, c ≠ id
//!
//! select  SELECT json_object('c', c, .., 'metadata', json(metadata)) AS record
//!         FROM t WHERE .. ORDER BY .., rowid LIMIT ?
//!
//! update  UPDATE t SET c = ?, .. WHERE ..
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::Row;
use tracing::trace;

use crate::error::{DbError, DbResult};
use crate::pool::SqliteStore;
use crate::store::{check_record, Condition, Filter, Record, RecordStore, SortOrder, Table};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        // JSON columns are stored as their serialized text.
        other => query.bind(other.to_string()),
    }
}

/// Renders the WHERE clause and collects its parameters in order.
fn where_clause(filter: &Filter, params: &mut Vec<Value>) -> String {
    let parts: Vec<String> = filter
        .conditions()
        .iter()
        .map(|condition| match condition {
            Condition::Eq(column, Value::Null) | Condition::IsNull(column) => {
                format!("{} IS NULL", column)
            }
            Condition::Eq(column, value) => {
                params.push(value.clone());
                format!("{} = ?", column)
            }
            Condition::NotNull(column) => format!("{} IS NOT NULL", column),
        })
        .collect();

    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn projection(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|column| {
            if table.json_columns().contains(column) {
                format!("'{0}', json({0})", column)
            } else {
                format!("'{0}', {0}", column)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQLite has no boolean type; turn 0/1 back into JSON booleans.
fn normalize_bools(table: Table, record: &mut Record) {
    for column in table.bool_columns() {
        if let Some(value) = record.get_mut(*column) {
            if let Some(n) = value.as_i64() {
                *value = Value::Bool(n != 0);
            }
        }
    }
}

pub(crate) fn upsert_sql(table: Table, columns: &[&str], conflict_key: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != "id" && !conflict_key.contains(c))
        .map(|c| format!("{0} = excluded.{0}", c))
        .collect();

    let action = if updates.is_empty() {
        "NOTHING".to_string()
    } else {
        format!("UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO {}",
        table.name(),
        columns.join(", "),
        placeholders,
        conflict_key.join(", "),
        action
    )
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert(&self, table: Table, record: Record, conflict_key: &[&str]) -> DbResult<()> {
        check_record(table, &record, conflict_key)?;

        let columns: Vec<&str> = record.keys().map(String::as_str).collect();
        let sql = upsert_sql(table, &columns, conflict_key);
        trace!(sql = %sql, "upsert");

        let mut query = sqlx::query(&sql);
        for value in record.values() {
            query = bind_value(query, value);
        }
        query.execute(self.pool()).await?;

        Ok(())
    }

    async fn select(&self, table: Table, filter: &Filter) -> DbResult<Vec<Record>> {
        filter.check(table)?;

        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT json_object({}) AS record FROM {}",
            projection(table),
            table.name()
        );
        sql.push_str(&where_clause(filter, &mut params));

        match filter.ordering() {
            Some((column, SortOrder::Asc)) => {
                sql.push_str(&format!(" ORDER BY {} ASC, rowid ASC", column))
            }
            Some((column, SortOrder::Desc)) => {
                sql.push_str(&format!(" ORDER BY {} DESC, rowid DESC", column))
            }
            None => sql.push_str(" ORDER BY rowid ASC"),
        }
        if let Some(limit) = filter.max_rows() {
            sql.push_str(" LIMIT ?");
            params.push(Value::from(limit as i64));
        }
        trace!(sql = %sql, "select");

        let mut query = sqlx::query(&sql);
        for value in &params {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(self.pool()).await?;

        rows.iter()
            .map(|row| -> DbResult<Record> {
                let text: String = row.try_get("record")?;
                let mut record: Record = serde_json::from_str(&text)
                    .map_err(|e| DbError::decode(table.name(), "record", e.to_string()))?;
                normalize_bools(table, &mut record);
                Ok(record)
            })
            .collect()
    }

    async fn update(&self, table: Table, patch: Record, filter: &Filter) -> DbResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        for column in patch.keys() {
            table.check_column(column)?;
        }
        filter.check(table)?;

        let assignments: Vec<String> = patch.keys().map(|c| format!("{} = ?", c)).collect();
        let mut params = Vec::new();
        let sql = format!(
            "UPDATE {} SET {}{}",
            table.name(),
            assignments.join(", "),
            where_clause(filter, &mut params)
        );
        trace!(sql = %sql, "update");

        let mut query = sqlx::query(&sql);
        for value in patch.values().chain(params.iter()) {
            query = bind_value(query, value);
        }
        let result = query.execute(self.pool()).await?;

        Ok(result.rows_affected())
    }
}
