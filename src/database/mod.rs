//! Database module
//!
//! This module provides all local-store functionality including:
//! - Schema and migrations
//! - Model definitions
//! - Repository layer for item CRUD, the push outbox, and sync cursors

pub mod models;
pub mod repository;
pub mod schema;

pub use models::*;
pub use repository::ItemRepository;
pub use schema::initialize_database;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Connection options shared by the migration and application pools.
/// WAL mode and a busy timeout let the flusher and listener tasks write
/// concurrently with foreground item operations.
fn connect_options(db_path: &Path) -> Result<SqliteConnectOptions> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    Ok(opts)
}

/// Open the item database and bring its schema up to date.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is created, so every application
/// connection is opened after the final schema has committed and none
/// can hold a stale cached view of a migrated table.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::info!("Opening item database at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path)?)
        .await?;

    initialize_database(&migration_pool).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(db_path)?)
        .await?;

    tracing::info!("Database pool created successfully");

    Ok(pool)
}
