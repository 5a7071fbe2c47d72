//! Liquid-culture repository. LCs have their own readable-id scheme
//! (`LC-YYYYMMDD-NN`) and a flat status field with no state machine.

use crate::error::{AppError, Result};
use crate::model::{LcStatus, LiquidCulture};
use chrono::Local;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

use super::ids::{self, IdTable};
use super::Pool;

const LC_PREFIX: &str = "LC";

#[derive(Debug, Clone, Default)]
pub struct NewLiquidCulture {
    pub strain_id: Option<i64>,
    pub volume_ml: Option<f64>,
    pub notes: Option<String>,
}

fn lc_from_row(row: &SqliteRow) -> Result<LiquidCulture> {
    let status_str: String = row.get("status");
    let status = LcStatus::parse(&status_str)
        .ok_or_else(|| AppError::Conflict(format!("unknown LC status {status_str}")))?;
    Ok(LiquidCulture {
        id: row.get("id"),
        readable_id: row.get("readable_id"),
        strain_id: row.get("strain_id"),
        strain_name: row.try_get("strain_name").ok(),
        status,
        volume_ml: row.get("volume_ml"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Create an ACTIVE liquid culture with a freshly generated readable id.
/// Generation and insert share one transaction; a raced id is retried once.
#[instrument(skip_all)]
pub async fn create_liquid_culture(pool: &Pool, new: NewLiquidCulture) -> Result<LiquidCulture> {
    match try_create_lc(pool, &new).await {
        Err(err) if err.is_unique_violation() => match try_create_lc(pool, &new).await {
            Err(err) if err.is_unique_violation() => Err(AppError::Conflict(
                "LC id allocation raced twice; retry the request".into(),
            )),
            other => other,
        },
        other => other,
    }
}

async fn try_create_lc(pool: &Pool, new: &NewLiquidCulture) -> Result<LiquidCulture> {
    let mut tx = pool.begin().await?;
    let date_key = ids::lc_date_key(Local::now().date_naive());
    let seq = ids::next_sequence(&mut *tx, IdTable::LiquidCultures, LC_PREFIX, &date_key).await?;
    let readable_id = ids::format_readable_id(LC_PREFIX, &date_key, seq);

    let row = sqlx::query(
        "INSERT INTO liquid_cultures (readable_id, strain_id, status, volume_ml, notes) \
         VALUES (?, ?, 'ACTIVE', ?, ?) \
         RETURNING id, readable_id, strain_id, status, volume_ml, notes, created_at, updated_at",
    )
    .bind(&readable_id)
    .bind(new.strain_id)
    .bind(new.volume_ml)
    .bind(new.notes.as_deref().unwrap_or(""))
    .fetch_one(&mut *tx)
    .await?;
    let lc = lc_from_row(&row)?;
    tx.commit().await?;
    Ok(lc)
}

#[instrument(skip_all)]
pub async fn list_liquid_cultures(pool: &Pool) -> Result<Vec<LiquidCulture>> {
    let rows = sqlx::query(
        "SELECT lc.id, lc.readable_id, lc.strain_id, lc.status, lc.volume_ml, lc.notes, \
                lc.created_at, lc.updated_at, s.name AS strain_name \
         FROM liquid_cultures lc \
         LEFT JOIN strains s ON s.id = lc.strain_id \
         ORDER BY datetime(lc.created_at) DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(lc_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_lc_status(pool: &Pool, id: i64, status: LcStatus) -> Result<()> {
    let res = sqlx::query(
        "UPDATE liquid_cultures SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(format!("liquid culture {id}")));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn update_lc_notes(pool: &Pool, id: i64, notes: &str) -> Result<()> {
    let res = sqlx::query(
        "UPDATE liquid_cultures SET notes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(notes)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(format!("liquid culture {id}")));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_liquid_culture(pool: &Pool, id: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM liquid_cultures WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(format!("liquid culture {id}")));
    }
    Ok(())
}
