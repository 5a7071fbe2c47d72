//! Strain catalogue.

use crate::error::{AppError, Result};
use crate::model::Strain;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

use super::Pool;

fn strain_from_row(row: &SqliteRow) -> Strain {
    Strain {
        id: row.get("id"),
        name: row.get("name"),
        colonization_days: row.get("colonization_days"),
        created_at: row.get("created_at"),
    }
}

#[instrument(skip_all)]
pub async fn list_strains(pool: &Pool) -> Result<Vec<Strain>> {
    let rows = sqlx::query(
        "SELECT id, name, colonization_days, created_at FROM strains ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(strain_from_row).collect())
}

#[instrument(skip_all)]
pub async fn get_strain(pool: &Pool, id: i64) -> Result<Strain> {
    let row = sqlx::query("SELECT id, name, colonization_days, created_at FROM strains WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(strain_from_row(&row)),
        None => Err(AppError::not_found(format!("strain {id}"))),
    }
}

#[instrument(skip_all)]
pub async fn create_strain(pool: &Pool, name: &str, colonization_days: i64) -> Result<Strain> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Strain name must be non-empty."));
    }
    if colonization_days <= 0 {
        return Err(AppError::validation("Colonization days must be positive."));
    }
    let result = sqlx::query(
        "INSERT INTO strains (name, colonization_days) VALUES (?, ?) \
         RETURNING id, name, colonization_days, created_at",
    )
    .bind(name)
    .bind(colonization_days)
    .fetch_one(pool)
    .await;
    match result {
        Ok(row) => Ok(strain_from_row(&row)),
        Err(err) => {
            let err = AppError::from(err);
            if err.is_unique_violation() {
                Err(AppError::Conflict(format!("strain {name} already exists")))
            } else {
                Err(err)
            }
        }
    }
}

#[instrument(skip_all)]
pub async fn delete_strain(pool: &Pool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM strains WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await;
    match result {
        Ok(res) if res.rows_affected() == 0 => {
            Err(AppError::not_found(format!("strain {id}")))
        }
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.message().contains("FOREIGN KEY") => Err(
            AppError::Conflict(format!("strain {id} is still referenced by batches")),
        ),
        Err(err) => Err(err.into()),
    }
}
