//! Batch repository: creation, lifecycle transitions, lineage, listings.

use crate::error::{AppError, Result};
use crate::model::{Batch, BatchStatus, BatchType};
use chrono::{Duration, Local, Utc};
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

use super::ids::{self, IdTable};
use super::{event, Pool};

/// Paginated listings only accept these page sizes.
pub const PAGE_LIMITS: [i64; 3] = [30, 50, 100];
const DEFAULT_PAGE_LIMIT: i64 = 50;

pub const MAX_BULK_QUANTITY: i64 = 100;

/// Ceiling for the sold-listing window; wider requests are clamped so an
/// arbitrary `days` value cannot overflow the cutoff arithmetic.
pub const MAX_SOLD_WINDOW_DAYS: i64 = 365;
/// Page numbers are clamped to this ceiling; `(page - 1) * limit` must never
/// overflow.
pub const MAX_PAGE: i64 = 10_000;

#[derive(Debug, Clone, Default)]
pub struct NewBatch {
    pub batch_type: Option<BatchType>,
    pub strain_id: Option<i64>,
    pub parent_readable_id: Option<String>,
    pub lc_batch: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub batch_type: BatchType,
    pub quantity: i64,
    pub strain_id: Option<i64>,
    pub parent_readable_id: Option<String>,
    pub lc_batch: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageQuery {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub batch_type: Option<BatchType>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchPage {
    pub batches: Vec<Batch>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
}

/// Slim view of a related batch used on the lineage panel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchRef {
    pub id: i64,
    pub readable_id: String,
    #[serde(rename = "type")]
    pub batch_type: BatchType,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchLineage {
    pub batch: Batch,
    pub parent: Option<BatchRef>,
    pub children: Vec<BatchRef>,
    /// Derived warning: the immediate parent is CONTAMINATED, so this batch
    /// is high-risk.
    pub parent_contaminated: bool,
}

pub(crate) fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    let type_str: String = row.get("type");
    let status_str: String = row.get("status");
    let batch_type = BatchType::parse(&type_str)
        .ok_or_else(|| AppError::Conflict(format!("unknown batch type {type_str}")))?;
    let status = BatchStatus::parse(&status_str)
        .ok_or_else(|| AppError::Conflict(format!("unknown batch status {status_str}")))?;
    Ok(Batch {
        id: row.get("id"),
        readable_id: row.get("readable_id"),
        batch_type,
        status,
        strain_id: row.get("strain_id"),
        parent_id: row.get("parent_id"),
        lc_batch: row.get("lc_batch"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        sold_at: row.get("sold_at"),
        updated_at: row.get("updated_at"),
    })
}

const BATCH_COLUMNS: &str =
    "id, readable_id, type, status, strain_id, parent_id, lc_batch, notes, \
     created_at, sold_at, updated_at";

#[instrument(skip_all)]
pub async fn get_batch(pool: &Pool, id: i64) -> Result<Batch> {
    let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => batch_from_row(&row),
        None => Err(AppError::not_found(format!("batch {id}"))),
    }
}

#[instrument(skip_all)]
pub async fn get_batch_by_readable_id(pool: &Pool, readable_id: &str) -> Result<Batch> {
    let row = sqlx::query(&format!(
        "SELECT {BATCH_COLUMNS} FROM batches WHERE readable_id = ?"
    ))
    .bind(readable_id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => batch_from_row(&row),
        None => Err(AppError::not_found(format!("batch {readable_id}"))),
    }
}

/// Resolved parent fields for SUBSTRATE/BULK creation: the strain is copied
/// at creation time, not re-derived later.
struct ResolvedParent {
    parent_id: Option<i64>,
    strain_id: Option<i64>,
}

async fn resolve_parent_tx(
    tx: &mut Transaction<'_, Sqlite>,
    batch_type: BatchType,
    strain_id: Option<i64>,
    parent_readable_id: Option<&str>,
) -> Result<ResolvedParent> {
    if batch_type == BatchType::Grain {
        let strain_id = strain_id
            .ok_or_else(|| AppError::validation("Strain is required for GRAIN batches."))?;
        return Ok(ResolvedParent {
            parent_id: None,
            strain_id: Some(strain_id),
        });
    }

    let parent_rid = parent_readable_id.ok_or_else(|| {
        AppError::validation("Parent Source ID is required for SUBSTRATE/BULK batches.")
    })?;
    let row = sqlx::query("SELECT id, strain_id FROM batches WHERE readable_id = ?")
        .bind(parent_rid)
        .fetch_optional(&mut **tx)
        .await?;
    let Some(row) = row else {
        return Err(AppError::not_found(format!("parent batch {parent_rid}")));
    };
    Ok(ResolvedParent {
        parent_id: Some(row.get("id")),
        strain_id: row.get("strain_id"),
    })
}

async fn insert_batch_tx(
    tx: &mut Transaction<'_, Sqlite>,
    readable_id: &str,
    batch_type: BatchType,
    strain_id: Option<i64>,
    parent_id: Option<i64>,
    lc_batch: &str,
    notes: &str,
) -> Result<Batch> {
    let row = sqlx::query(&format!(
        "INSERT INTO batches (readable_id, type, status, strain_id, parent_id, lc_batch, notes) \
         VALUES (?, ?, 'INCUBATING', ?, ?, ?, ?) RETURNING {BATCH_COLUMNS}"
    ))
    .bind(readable_id)
    .bind(batch_type.as_str())
    .bind(strain_id)
    .bind(parent_id)
    .bind(lc_batch)
    .bind(notes)
    .fetch_one(&mut **tx)
    .await?;
    batch_from_row(&row)
}

async fn try_create_batch(pool: &Pool, new: &NewBatch) -> Result<Batch> {
    let batch_type = new
        .batch_type
        .ok_or_else(|| AppError::validation("Batch type is required."))?;

    let mut tx = pool.begin().await?;
    let resolved = resolve_parent_tx(
        &mut tx,
        batch_type,
        new.strain_id,
        new.parent_readable_id.as_deref(),
    )
    .await?;

    let date_key = ids::batch_date_key(Local::now().date_naive());
    let seq = ids::next_sequence(&mut *tx, IdTable::Batches, batch_type.id_prefix(), &date_key)
        .await?;
    let readable_id = ids::format_readable_id(batch_type.id_prefix(), &date_key, seq);

    let batch = insert_batch_tx(
        &mut tx,
        &readable_id,
        batch_type,
        resolved.strain_id,
        resolved.parent_id,
        new.lc_batch.as_deref().unwrap_or(""),
        new.notes.as_deref().unwrap_or(""),
    )
    .await?;

    event::log_event(
        &mut *tx,
        batch.id,
        "CREATED",
        json!({
            "type": batch_type.as_str(),
            "parent": new.parent_readable_id.as_deref().unwrap_or("none"),
        }),
    )
    .await?;

    tx.commit().await?;
    Ok(batch)
}

/// Create a single batch with a freshly generated readable id and a CREATED
/// event, all in one transaction. Retries once if a concurrent writer claims
/// the same id before surfacing a conflict.
#[instrument(skip_all)]
pub async fn create_batch(pool: &Pool, new: NewBatch) -> Result<Batch> {
    match try_create_batch(pool, &new).await {
        Err(err) if err.is_unique_violation() => match try_create_batch(pool, &new).await {
            Err(err) if err.is_unique_violation() => Err(AppError::Conflict(
                "readable id allocation raced twice; retry the request".into(),
            )),
            other => other,
        },
        other => other,
    }
}

async fn try_create_bulk(pool: &Pool, req: &BulkRequest) -> Result<Vec<Batch>> {
    let mut tx = pool.begin().await?;
    let resolved = resolve_parent_tx(
        &mut tx,
        req.batch_type,
        req.strain_id,
        req.parent_readable_id.as_deref(),
    )
    .await?;

    let prefix = req.batch_type.id_prefix();
    let date_key = ids::batch_date_key(Local::now().date_naive());
    let start_seq = ids::next_sequence(&mut *tx, IdTable::Batches, prefix, &date_key).await?;

    // Contiguous block: either every row lands or the transaction rolls back.
    let mut batches = Vec::with_capacity(req.quantity as usize);
    for i in 0..req.quantity {
        let readable_id = ids::format_readable_id(prefix, &date_key, start_seq + i);
        let batch = insert_batch_tx(
            &mut tx,
            &readable_id,
            req.batch_type,
            resolved.strain_id,
            resolved.parent_id,
            req.lc_batch.as_deref().unwrap_or(""),
            req.notes.as_deref().unwrap_or(""),
        )
        .await?;
        batches.push(batch);
    }
    tx.commit().await?;

    // Audit rows are advisory; a failed write must not undo the inserts.
    for batch in &batches {
        event::log_event_best_effort(
            pool,
            batch.id,
            "CREATED",
            json!({
                "bulk_created": true,
                "parent": req.parent_readable_id.as_deref().unwrap_or("none"),
            }),
        )
        .await;
    }
    Ok(batches)
}

/// Create `quantity` batches sharing one parent and a contiguous, gap-free
/// readable-id block.
#[instrument(skip_all)]
pub async fn create_bulk_batches(pool: &Pool, req: BulkRequest) -> Result<Vec<Batch>> {
    if req.quantity < 1 || req.quantity > MAX_BULK_QUANTITY {
        return Err(AppError::validation(format!(
            "Quantity must be between 1 and {MAX_BULK_QUANTITY}."
        )));
    }
    match try_create_bulk(pool, &req).await {
        Err(err) if err.is_unique_violation() => match try_create_bulk(pool, &req).await {
            Err(err) if err.is_unique_violation() => Err(AppError::Conflict(
                "readable id block allocation raced twice; retry the request".into(),
            )),
            other => other,
        },
        other => other,
    }
}

/// Apply a lifecycle transition. Illegal transitions are rejected. The event
/// records the actual prior status.
#[instrument(skip_all)]
pub async fn update_batch_status(pool: &Pool, id: i64, new_status: BatchStatus) -> Result<Batch> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query("SELECT status FROM batches WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Err(AppError::not_found(format!("batch {id}")));
    };
    let current_str: String = row.get("status");
    let current = BatchStatus::parse(&current_str)
        .ok_or_else(|| AppError::Conflict(format!("unknown batch status {current_str}")))?;

    if !current.can_transition_to(new_status) {
        return Err(AppError::InvalidTransition {
            from: current.as_str().into(),
            to: new_status.as_str().into(),
        });
    }

    // Entering SOLD stamps sold_at; reverting a sale clears it. Archiving a
    // sold batch keeps the stamp for the sales history.
    let row = if new_status == BatchStatus::Sold {
        sqlx::query(&format!(
            "UPDATE batches SET status = ?, sold_at = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? RETURNING {BATCH_COLUMNS}"
        ))
        .bind(new_status.as_str())
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
    } else if current == BatchStatus::Sold && new_status != BatchStatus::Archived {
        sqlx::query(&format!(
            "UPDATE batches SET status = ?, sold_at = NULL, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? RETURNING {BATCH_COLUMNS}"
        ))
        .bind(new_status.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
    } else {
        sqlx::query(&format!(
            "UPDATE batches SET status = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? RETURNING {BATCH_COLUMNS}"
        ))
        .bind(new_status.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
    };
    let batch = batch_from_row(&row)?;

    event::log_event(
        &mut *tx,
        id,
        new_status.as_str(),
        json!({ "previous_status": current.as_str() }),
    )
    .await?;

    tx.commit().await?;
    Ok(batch)
}

/// Mark a set of batches SOLD in one statement. Every batch must legally
/// reach SOLD or nothing changes; per-id event rows are best-effort.
#[instrument(skip_all)]
pub async fn mark_bulk_as_sold(pool: &Pool, ids: &[i64]) -> Result<()> {
    // duplicates would trip the row-count check below
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut tx = pool.begin().await?;

    let select_sql = format!("SELECT id, status FROM batches WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&select_sql);
    for id in &ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(&mut *tx).await?;
    if rows.len() != ids.len() {
        return Err(AppError::not_found("one or more batches"));
    }

    let mut previous = Vec::with_capacity(rows.len());
    for row in &rows {
        let status_str: String = row.get("status");
        let status = BatchStatus::parse(&status_str)
            .ok_or_else(|| AppError::Conflict(format!("unknown batch status {status_str}")))?;
        if !status.can_transition_to(BatchStatus::Sold) {
            return Err(AppError::InvalidTransition {
                from: status.as_str().into(),
                to: BatchStatus::Sold.as_str().into(),
            });
        }
        previous.push((row.get::<i64, _>("id"), status));
    }

    let sold_at = Utc::now();
    let update_sql = format!(
        "UPDATE batches SET status = 'SOLD', sold_at = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id IN ({placeholders})"
    );
    let mut update = sqlx::query(&update_sql).bind(sold_at);
    for id in &ids {
        update = update.bind(id);
    }
    update.execute(&mut *tx).await?;
    tx.commit().await?;

    for (id, prev) in previous {
        event::log_event_best_effort(
            pool,
            id,
            "SOLD",
            json!({ "bulk_sold": true, "previous_status": prev.as_str() }),
        )
        .await;
    }
    Ok(())
}

/// Active-batch listing: SOLD and ARCHIVED are always excluded, search is a
/// readable-id prefix match, newest first.
#[instrument(skip_all)]
pub async fn get_batches_paginated(pool: &Pool, q: PageQuery) -> Result<BatchPage> {
    let limit = if PAGE_LIMITS.contains(&q.limit) {
        q.limit
    } else {
        DEFAULT_PAGE_LIMIT
    };
    let page = q.page.clamp(1, MAX_PAGE);
    let offset = (page - 1) * limit;

    let mut filters = String::from("status NOT IN ('SOLD', 'ARCHIVED')");
    if q.search.is_some() {
        filters.push_str(" AND readable_id LIKE ?");
    }
    if q.batch_type.is_some() {
        filters.push_str(" AND type = ?");
    }
    let search_pattern = q.search.as_ref().map(|s| format!("{s}%"));

    let count_sql = format!("SELECT COUNT(*) FROM batches WHERE {filters}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(pattern) = &search_pattern {
        count_query = count_query.bind(pattern);
    }
    if let Some(t) = q.batch_type {
        count_query = count_query.bind(t.as_str());
    }
    let total_count = count_query.fetch_one(pool).await?;

    let data_sql = format!(
        "SELECT {BATCH_COLUMNS} FROM batches WHERE {filters} \
         ORDER BY datetime(created_at) DESC, readable_id DESC LIMIT ? OFFSET ?"
    );
    let mut data_query = sqlx::query(&data_sql);
    if let Some(pattern) = &search_pattern {
        data_query = data_query.bind(pattern);
    }
    if let Some(t) = q.batch_type {
        data_query = data_query.bind(t.as_str());
    }
    let rows = data_query.bind(limit).bind(offset).fetch_all(pool).await?;

    let batches = rows
        .iter()
        .map(batch_from_row)
        .collect::<Result<Vec<_>>>()?;
    Ok(BatchPage {
        batches,
        total_count,
        page,
        limit,
    })
}

/// SOLD batches with `sold_at` inside the trailing window (clamped to
/// 1..=365 days), newest sale first.
#[instrument(skip_all)]
pub async fn get_sold_batches(pool: &Pool, days: i64) -> Result<Vec<Batch>> {
    let days = days.clamp(1, MAX_SOLD_WINDOW_DAYS);
    let cutoff = Utc::now() - Duration::days(days);
    let rows = sqlx::query(&format!(
        "SELECT {BATCH_COLUMNS} FROM batches \
         WHERE status = 'SOLD' AND datetime(sold_at) >= datetime(?) \
         ORDER BY datetime(sold_at) DESC"
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    rows.iter().map(batch_from_row).collect()
}

/// GRAIN batches sitting READY, newest first (the scan page's pick list).
#[instrument(skip_all)]
pub async fn get_ready_grain_batches(pool: &Pool) -> Result<Vec<Batch>> {
    let rows = sqlx::query(&format!(
        "SELECT {BATCH_COLUMNS} FROM batches \
         WHERE type = 'GRAIN' AND status = 'READY' \
         ORDER BY datetime(created_at) DESC"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(batch_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_batch_notes(pool: &Pool, id: i64, notes: &str) -> Result<()> {
    let res = sqlx::query(
        "UPDATE batches SET notes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(notes)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(format!("batch {id}")));
    }
    Ok(())
}

/// Hard delete. Event rows cascade; children keep existing with a null
/// parent.
#[instrument(skip_all)]
pub async fn delete_batch(pool: &Pool, id: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM batches WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(format!("batch {id}")));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_bulk_batches(pool: &Pool, ids: &[i64]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let delete_sql = format!("DELETE FROM batches WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&delete_sql);
    for id in ids {
        query = query.bind(id);
    }
    query.execute(pool).await?;
    Ok(())
}

fn ref_from_row(row: &SqliteRow) -> Result<BatchRef> {
    let type_str: String = row.get("type");
    let status_str: String = row.get("status");
    Ok(BatchRef {
        id: row.get("id"),
        readable_id: row.get("readable_id"),
        batch_type: BatchType::parse(&type_str)
            .ok_or_else(|| AppError::Conflict(format!("unknown batch type {type_str}")))?,
        status: BatchStatus::parse(&status_str)
            .ok_or_else(|| AppError::Conflict(format!("unknown batch status {status_str}")))?,
    })
}

/// One-hop lineage: the immediate parent (with a contamination warning) and
/// immediate children.
#[instrument(skip_all)]
pub async fn get_batch_lineage(pool: &Pool, id: i64) -> Result<BatchLineage> {
    let batch = get_batch(pool, id).await?;

    let parent = match batch.parent_id {
        Some(parent_id) => {
            sqlx::query("SELECT id, readable_id, type, status FROM batches WHERE id = ?")
                .bind(parent_id)
                .fetch_optional(pool)
                .await?
                .map(|row| ref_from_row(&row))
                .transpose()?
        }
        None => None,
    };

    let rows = sqlx::query(
        "SELECT id, readable_id, type, status FROM batches WHERE parent_id = ? \
         ORDER BY datetime(created_at)",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    let children = rows
        .iter()
        .map(ref_from_row)
        .collect::<Result<Vec<_>>>()?;

    let parent_contaminated = parent
        .as_ref()
        .map(|p| p.status == BatchStatus::Contaminated)
        .unwrap_or(false);

    Ok(BatchLineage {
        batch,
        parent,
        children,
        parent_contaminated,
    })
}
