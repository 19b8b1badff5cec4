//! # Schema Migrations
//!
//! The files under `migrations/sqlite/` are compiled into the binary and
//! applied on open; sqlx records each in `_sqlx_migrations`.
//!
//! ```text
//!   001_initial_schema.sql    orders, platform_chats, platform_messages
//!   002_message_platform.sql  platform_messages.platform, relay scan index
//! ```
//!
//! Add a new `NNN_description.sql` rather than editing an applied one, and
//! keep [`Table::columns`](crate::store::Table::columns) in step with it.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations. Safe to call on every start.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;
    Ok((MIGRATOR.migrations.len(), applied as usize))
}
