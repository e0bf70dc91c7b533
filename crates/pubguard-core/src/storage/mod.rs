//! SQLite storage layer for the approval, publishing, and recovery core (C1).
//!
//! Two separate SQLite databases are opened: the main content database
//! (drafts, queue entries, audit log, recovery log, global publish state)
//! and a small, separate scheduler fire-time index. Keeping the scheduler's
//! bookkeeping in its own file means it never shares a transaction, a lock,
//! or an encryption boundary with the content database (see design notes).

pub mod audit;
pub mod clients;
pub mod drafts;
pub mod global_state;
pub mod queue;
pub mod recovery;
pub mod scheduler_store;
pub mod util;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::StorageError;

/// Type alias for the SQLite connection pool backing the main content store.
pub type DbPool = sqlx::SqlitePool;

/// Type alias for the SQLite connection pool backing the scheduler's
/// fire-time index. Distinct type alias so call sites can't accidentally
/// pass one pool where the other is expected.
pub type SchedulerDbPool = sqlx::SqlitePool;

async fn open_pool(path: &str, max_connections: u32) -> Result<sqlx::SqlitePool, StorageError> {
    let expanded = expand_tilde(path);

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                source: sqlx::Error::Configuration(
                    format!("failed to create directory {}: {e}", parent.display()).into(),
                ),
            })?;
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&format!("sqlite:{expanded}"))
        .map_err(|e| StorageError::Connection { source: e })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(300))
        .connect_with(connect_options)
        .await
        .map_err(|e| StorageError::Connection { source: e })
}

/// Open (creating if necessary) the main content database and run migrations.
pub async fn init_db(db_path: &str) -> Result<DbPool, StorageError> {
    let pool = open_pool(db_path, 4).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Migration { source: e })?;

    Ok(pool)
}

/// Open (creating if necessary) the scheduler's separate fire-time database.
pub async fn init_scheduler_db(db_path: &str) -> Result<SchedulerDbPool, StorageError> {
    let pool = open_pool(db_path, 2).await?;

    sqlx::migrate!("./migrations_scheduler")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Migration { source: e })?;

    Ok(pool)
}

/// In-memory main content database for tests.
#[cfg(any(test, feature = "test-helpers"))]
pub async fn init_test_db() -> Result<DbPool, StorageError> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| StorageError::Connection { source: e })?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(|e| StorageError::Connection { source: e })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Migration { source: e })?;

    Ok(pool)
}

/// In-memory scheduler fire-time database for tests.
#[cfg(any(test, feature = "test-helpers"))]
pub async fn init_test_scheduler_db() -> Result<SchedulerDbPool, StorageError> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| StorageError::Connection { source: e })?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(|e| StorageError::Connection { source: e })?;

    sqlx::migrate!("./migrations_scheduler")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Migration { source: e })?;

    Ok(pool)
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_test_db_creates_all_tables() {
        let pool = init_test_db().await.expect("init test db");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("query tables");

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"drafts"));
        assert!(table_names.contains(&"queue_entries"));
        assert!(table_names.contains(&"audit_log"));
        assert!(table_names.contains(&"recovery_log"));
        assert!(table_names.contains(&"global_publish_state"));
    }

    #[tokio::test]
    async fn init_test_scheduler_db_creates_fire_table() {
        let pool = init_test_scheduler_db().await.expect("init scheduler db");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations'",
        )
        .fetch_all(&pool)
        .await
        .expect("query tables");

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"scheduler_fires"));
    }

    #[tokio::test]
    async fn init_db_creates_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("test.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let pool = init_db(&db_path_str).await.expect("init db");
        assert!(db_path.exists());
        pool.close().await;
    }
}
