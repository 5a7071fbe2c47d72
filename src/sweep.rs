//! Daily ready-check automation: promotes GRAIN batches that have finished
//! their incubation window. Safe to run any number of times; the status
//! filter makes re-runs no-ops for already-promoted batches.

use crate::db::{self, Pool};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::Row;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub updated: usize,
    pub updated_ids: Vec<i64>,
}

fn days_since(now: DateTime<Utc>, created_at: DateTime<Utc>) -> i64 {
    // ceiling: a batch 11 days and 1 second old counts as 12 days
    let secs = (now - created_at).num_seconds().max(0);
    (secs + 86_399) / 86_400
}

#[instrument(skip_all)]
pub async fn run_ready_check(pool: &Pool, ready_after_days: i64) -> Result<SweepSummary> {
    let now = Utc::now();
    let rows = sqlx::query(
        "SELECT id, created_at FROM batches WHERE type = 'GRAIN' AND status = 'INCUBATING'",
    )
    .fetch_all(pool)
    .await?;
    let checked = rows.len();

    let due: Vec<i64> = rows
        .into_iter()
        .filter_map(|row| {
            let created_at: DateTime<Utc> = row.get("created_at");
            (days_since(now, created_at) >= ready_after_days).then(|| row.get::<i64, _>("id"))
        })
        .collect();

    // only rows the guarded update actually touched get events and count
    // towards the summary; a batch mutated between the select and the update
    // is not reported as promoted
    let mut promoted: Vec<i64> = Vec::new();
    if !due.is_empty() {
        let placeholders = vec!["?"; due.len()].join(", ");
        let sql = format!(
            "UPDATE batches SET status = 'READY', updated_at = CURRENT_TIMESTAMP \
             WHERE id IN ({placeholders}) AND status = 'INCUBATING' RETURNING id"
        );
        let mut update = sqlx::query_scalar::<_, i64>(&sql);
        for id in &due {
            update = update.bind(id);
        }
        promoted = update.fetch_all(pool).await?;

        for id in &promoted {
            db::log_event_best_effort(
                pool,
                *id,
                "AUTO_READY",
                json!({
                    "previous_status": "INCUBATING",
                    "reason": format!("{ready_after_days}_days_incubation_complete"),
                }),
            )
            .await;
        }
        info!(
            checked,
            updated = promoted.len(),
            "ready-check promoted batches"
        );
    }

    Ok(SweepSummary {
        checked,
        updated: promoted.len(),
        updated_ids: promoted,
    })
}
