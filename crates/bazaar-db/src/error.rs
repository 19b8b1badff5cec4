//! # Store Error Types
//!
//! ```text
//!   sqlx::Error ──────┐
//!   MigrateError ─────┼──► DbError ──► SyncError::Store (bazaar-sync)
//!   serde_json / row ─┘
//! ```
//!
//! Constraint failures are told apart from the SQLite message text, since
//! sqlx reports them all as `Error::Database`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// An update or lookup addressed a row that is not there.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index other than the upsert's conflict target fired, e.g.
    /// a delivery id recorded twice in one chat.
    #[error("Duplicate value for {columns}")]
    UniqueViolation { columns: String },

    /// A message written for a chat row that does not exist.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// A stored value that does not map back onto the domain type.
    #[error("Cannot decode {table}.{column}: {reason}")]
    Decode {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Cannot open store: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn decode(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DbError::Decode {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let text = db_err.message();
                if let Some(columns) = text.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        columns: columns.to_string(),
                    }
                } else if text.starts_with("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation(text.to_string())
                } else {
                    DbError::QueryFailed(text.to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DbError::ConnectionFailed(err.to_string())
            }
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::decode("record", "json", err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
