//! Append-only event log.

use crate::error::Result;
use crate::model::Event;
use sqlx::{Row, Sqlite};
use tracing::warn;

use super::Pool;

/// Append one event row. Runs on the caller's executor so creation paths
/// can log inside their transaction.
pub async fn log_event<'e, E>(
    executor: E,
    batch_id: i64,
    action_type: &str,
    details: serde_json::Value,
) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rec = sqlx::query(
        "INSERT INTO events (batch_id, action_type, details) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(batch_id)
    .bind(action_type)
    .bind(details.to_string())
    .fetch_one(executor)
    .await?;
    Ok(rec.get("id"))
}

/// Best-effort variant used by bulk operations: the primary mutation is the
/// source of truth, a failed audit write must not roll it back.
pub async fn log_event_best_effort(
    pool: &Pool,
    batch_id: i64,
    action_type: &str,
    details: serde_json::Value,
) {
    if let Err(err) = log_event(pool, batch_id, action_type, details).await {
        warn!(?err, batch_id, action_type, "failed to log event");
    }
}

pub async fn list_events(pool: &Pool, batch_id: i64) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        "SELECT id, batch_id, action_type, details, created_at FROM events \
         WHERE batch_id = ? ORDER BY id",
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    let events = rows
        .into_iter()
        .map(|row| {
            let details: String = row.get("details");
            Event {
                id: row.get("id"),
                batch_id: row.get("batch_id"),
                action_type: row.get("action_type"),
                details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
                created_at: row.get("created_at"),
            }
        })
        .collect();
    Ok(events)
}
