//! Database module: SQLite pool setup and SQL repositories.
//!
//! Split by entity:
//! - `ids`: readable-id sequence generation.
//! - `batch`: batch CRUD, lifecycle transitions, lineage.
//! - `lc`: liquid cultures.
//! - `strain`: strain definitions.
//! - `event`: append-only audit trail.
//! - `report`: read-side aggregations for the dashboard.
//!
//! Callers import from `fungihub::db` — the repository APIs are re-exported
//! here.

pub mod batch;
pub mod event;
pub mod ids;
pub mod lc;
pub mod report;
pub mod strain;

pub use batch::*;
pub use event::*;
pub use ids::*;
pub use lc::*;
pub use report::*;
pub use strain::*;

use anyhow::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

pub type Pool = SqlitePool;

/// Open the SQLite pool. File-backed databases get WAL journaling and a
/// pre-created parent directory; foreign keys are enabled on every
/// connection so event rows cascade with their batch.
pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let mut opts = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let in_memory = database_url.starts_with("sqlite::memory");
    if !in_memory {
        opts = opts
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
    }

    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
