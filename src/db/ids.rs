//! Sequential, date-scoped readable-id generation.
//!
//! Readable ids look like `G-26082026-01` (batches, DDMMYYYY) or
//! `LC-20260826-01` (liquid cultures, YYYYMMDD). Sequences start at 1 per
//! (prefix, date) pair and are zero-padded to two digits for display only;
//! parsing and ordering handle wider suffixes, so day 100+ keeps counting
//! instead of wrapping.
//!
//! Callers run generation and insert inside one transaction; the UNIQUE
//! constraint on `readable_id` is the backstop for writers racing on the
//! same key, and the insert paths retry once on a unique violation.

use crate::error::{AppError, Result};
use chrono::NaiveDate;
use sqlx::Sqlite;

/// Which table a readable id is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdTable {
    Batches,
    LiquidCultures,
}

impl IdTable {
    fn table_name(&self) -> &'static str {
        match self {
            IdTable::Batches => "batches",
            IdTable::LiquidCultures => "liquid_cultures",
        }
    }
}

/// Date key for batch ids: DDMMYYYY.
pub fn batch_date_key(date: NaiveDate) -> String {
    date.format("%d%m%Y").to_string()
}

/// Date key for liquid-culture ids: YYYYMMDD.
pub fn lc_date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn format_readable_id(prefix: &str, date_key: &str, seq: i64) -> String {
    format!("{prefix}-{date_key}-{seq:02}")
}

/// Parse the numeric suffix of a readable id. Splits on the last hyphen so
/// a hyphen inside the prefix or date key cannot shift the sequence field.
pub fn parse_sequence(readable_id: &str) -> Option<i64> {
    let (_, suffix) = readable_id.rsplit_once('-')?;
    suffix.parse().ok()
}

/// Next unused sequence number for `{prefix}-{date_key}-`. Runs against the
/// caller's executor so it can participate in the insert transaction.
pub async fn next_sequence<'e, E>(
    executor: E,
    table: IdTable,
    prefix: &str,
    date_key: &str,
) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    // length-first ordering keeps `-100` above `-99`
    let sql = format!(
        "SELECT readable_id FROM {} WHERE readable_id LIKE ? \
         ORDER BY length(readable_id) DESC, readable_id DESC LIMIT 1",
        table.table_name()
    );
    let pattern = format!("{prefix}-{date_key}-%");
    let last: Option<String> = sqlx::query_scalar(&sql)
        .bind(&pattern)
        .fetch_optional(executor)
        .await?;

    match last {
        Some(id) => {
            let seq = parse_sequence(&id).ok_or_else(|| {
                AppError::Conflict(format!("unparseable readable id in sequence: {id}"))
            })?;
            Ok(seq + 1)
        }
        None => Ok(1),
    }
}
