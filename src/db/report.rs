//! Read-side aggregations for the dashboard. No side effects; `now` is an
//! argument so the date windows are testable.

use crate::error::Result;
use crate::model::BatchType;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;

use super::Pool;

/// Strains without a configured colonization duration forecast with this.
const DEFAULT_COLONIZATION_DAYS: i64 = 14;
const FORECAST_WINDOW_DAYS: i64 = 5;
const CONTAMINATION_WINDOW_DAYS: i64 = 30;
const EXPIRING_AFTER_DAYS: i64 = 45;
/// Ceiling for the monthly chart; the series is allocated up front, so the
/// caller-supplied month count is clamped.
pub const MAX_TRAILING_MONTHS: u32 = 24;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub ready: i64,
    pub incubating_spawn: i64,
    pub incubating_kits: i64,
    /// Trailing-30-day contamination percentage; 0.0 when nothing was
    /// created in the window.
    pub contamination_rate_pct: f64,
    /// INCUBATING GRAIN batches whose forecast ready date falls within the
    /// next five days, overdue ones included.
    pub ready_soon: i64,
    pub sold_last_30_days: i64,
    /// SUBSTRATE batches created this calendar month from a GRAIN parent.
    pub inoculated_this_month: i64,
    pub expiring: Vec<ExpiringBatch>,
}

/// INCUBATING batch past the 45-day mark, surfaced as an alert.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringBatch {
    pub readable_id: String,
    #[serde(rename = "type")]
    pub batch_type: BatchType,
    pub days_incubating: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonthlyInoculation {
    /// `YYYY-MM`.
    pub month: String,
    pub grain: i64,
    pub kits: i64,
}

async fn count_where(pool: &Pool, filter: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM batches WHERE {filter}");
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

#[instrument(skip_all)]
pub async fn dashboard_stats(pool: &Pool, now: DateTime<Utc>) -> Result<DashboardStats> {
    let ready = count_where(pool, "status = 'READY'").await?;
    let incubating_spawn =
        count_where(pool, "status = 'INCUBATING' AND type = 'GRAIN'").await?;
    let incubating_kits =
        count_where(pool, "status = 'INCUBATING' AND type IN ('SUBSTRATE', 'BULK')").await?;

    let window_start = now - Duration::days(CONTAMINATION_WINDOW_DAYS);
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, \
                SUM(CASE WHEN status = 'CONTAMINATED' THEN 1 ELSE 0 END) AS contaminated \
         FROM batches WHERE datetime(created_at) >= datetime(?)",
    )
    .bind(window_start)
    .fetch_one(pool)
    .await?;
    let total: i64 = row.get("total");
    let contaminated: i64 = row.try_get("contaminated").unwrap_or(0);
    let contamination_rate_pct = if total > 0 {
        contaminated as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let ready_soon = forecast_ready_soon(pool, now).await?;

    let sold_cutoff = now - Duration::days(30);
    let sold_last_30_days = sqlx::query_scalar(
        "SELECT COUNT(*) FROM batches \
         WHERE status = 'SOLD' AND datetime(sold_at) >= datetime(?)",
    )
    .bind(sold_cutoff)
    .fetch_one(pool)
    .await?;

    let month_start = now
        .date_naive()
        .with_day(1)
        .expect("day 1 is always valid")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let inoculated_this_month = sqlx::query_scalar(
        "SELECT COUNT(*) FROM batches b \
         JOIN batches p ON p.id = b.parent_id \
         WHERE b.type = 'SUBSTRATE' AND p.type = 'GRAIN' \
           AND datetime(b.created_at) >= datetime(?)",
    )
    .bind(month_start)
    .fetch_one(pool)
    .await?;

    let expiring_cutoff = now - Duration::days(EXPIRING_AFTER_DAYS);
    let rows = sqlx::query(
        "SELECT readable_id, type, created_at FROM batches \
         WHERE status = 'INCUBATING' AND datetime(created_at) < datetime(?) \
         ORDER BY datetime(created_at)",
    )
    .bind(expiring_cutoff)
    .fetch_all(pool)
    .await?;
    let expiring = rows
        .into_iter()
        .filter_map(|row| {
            let type_str: String = row.get("type");
            let created_at: DateTime<Utc> = row.get("created_at");
            BatchType::parse(&type_str).map(|batch_type| ExpiringBatch {
                readable_id: row.get("readable_id"),
                batch_type,
                days_incubating: (now - created_at).num_days(),
            })
        })
        .collect();

    Ok(DashboardStats {
        ready,
        incubating_spawn,
        incubating_kits,
        contamination_rate_pct,
        ready_soon,
        sold_last_30_days,
        inoculated_this_month,
        expiring,
    })
}

/// Per-strain forecast: a batch counts when `created_at +
/// colonization_days` lands inside the five-day window or already passed.
async fn forecast_ready_soon(pool: &Pool, now: DateTime<Utc>) -> Result<i64> {
    let rows = sqlx::query(
        "SELECT b.created_at, s.colonization_days FROM batches b \
         LEFT JOIN strains s ON s.id = b.strain_id \
         WHERE b.status = 'INCUBATING' AND b.type = 'GRAIN'",
    )
    .fetch_all(pool)
    .await?;

    let horizon = now + Duration::days(FORECAST_WINDOW_DAYS);
    let mut count = 0;
    for row in rows {
        let created_at: DateTime<Utc> = row.get("created_at");
        let days: Option<i64> = row.get("colonization_days");
        let ready_date = created_at + Duration::days(days.unwrap_or(DEFAULT_COLONIZATION_DAYS));
        if ready_date <= horizon {
            count += 1;
        }
    }
    Ok(count)
}

/// Creation counts per calendar month over the trailing `months` months
/// (clamped to 1..=24), split into grain spawn vs kits (substrate + bulk).
/// Months with no rows are zero-filled so the chart axis stays continuous.
#[instrument(skip_all)]
pub async fn monthly_inoculations(
    pool: &Pool,
    now: DateTime<Utc>,
    months: u32,
) -> Result<Vec<MonthlyInoculation>> {
    let months = months.clamp(1, MAX_TRAILING_MONTHS);
    let labels = trailing_month_labels(now, months);
    let first = labels.first().cloned().unwrap_or_default();

    let rows = sqlx::query(
        "SELECT strftime('%Y-%m', datetime(created_at)) AS month, \
                SUM(CASE WHEN type = 'GRAIN' THEN 1 ELSE 0 END) AS grain, \
                SUM(CASE WHEN type IN ('SUBSTRATE', 'BULK') THEN 1 ELSE 0 END) AS kits \
         FROM batches \
         WHERE strftime('%Y-%m', datetime(created_at)) >= ? \
         GROUP BY month",
    )
    .bind(&first)
    .fetch_all(pool)
    .await?;

    let mut result: Vec<MonthlyInoculation> = labels
        .into_iter()
        .map(|month| MonthlyInoculation {
            month,
            grain: 0,
            kits: 0,
        })
        .collect();
    for row in rows {
        let month: String = row.get("month");
        if let Some(entry) = result.iter_mut().find(|e| e.month == month) {
            entry.grain = row.try_get("grain").unwrap_or(0);
            entry.kits = row.try_get("kits").unwrap_or(0);
        }
    }
    Ok(result)
}

fn trailing_month_labels(now: DateTime<Utc>, months: u32) -> Vec<String> {
    let mut year = now.year();
    let mut month = now.month() as i32;
    let mut labels = Vec::with_capacity(months as usize);
    for _ in 0..months {
        labels.push(format!("{year:04}-{month:02}"));
        month -= 1;
        if month == 0 {
            month = 12;
            year -= 1;
        }
    }
    labels.reverse();
    labels
}
