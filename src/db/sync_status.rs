//! Per-source sync bookkeeping.
//!
//! One row per source type; every sync attempt bumps the counters in a
//! single upsert so concurrent syncs cannot lose an increment.

use crate::db::{now_rfc3339, parse_rfc3339};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub source_type: String,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub sync_count: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncStatus> {
    Ok(SyncStatus {
        source_type: row.try_get("source_type")?,
        last_sync_attempt: parse_rfc3339(row.try_get("last_sync_attempt")?),
        last_successful_sync: parse_rfc3339(row.try_get("last_successful_sync")?),
        sync_count: row.try_get("sync_count")?,
        error_count: row.try_get("error_count")?,
        last_error: row.try_get("last_error")?,
    })
}

/// Record the outcome of one sync attempt and return the updated row.
///
/// `error = None` marks success: `last_successful_sync` is set and any prior
/// `last_error` is cleared. An error bumps `error_count` and stores the
/// message, leaving `last_successful_sync` untouched.
pub async fn record_sync_result(
    pool: &SqlitePool,
    source_type: &str,
    error: Option<&str>,
) -> Result<SyncStatus> {
    let now = now_rfc3339();
    let success = error.is_none();

    let row = sqlx::query(
        "INSERT INTO sync_status \
           (source_type, last_sync_attempt, last_successful_sync, sync_count, error_count, last_error) \
         VALUES (?, ?, CASE WHEN ? THEN ? END, 1, CASE WHEN ? THEN 0 ELSE 1 END, ?) \
         ON CONFLICT (source_type) DO UPDATE SET \
           last_sync_attempt = excluded.last_sync_attempt, \
           last_successful_sync = CASE WHEN ? THEN excluded.last_sync_attempt \
                                       ELSE sync_status.last_successful_sync END, \
           sync_count = sync_status.sync_count + 1, \
           error_count = sync_status.error_count + CASE WHEN ? THEN 0 ELSE 1 END, \
           last_error = CASE WHEN ? THEN NULL ELSE excluded.last_error END \
         RETURNING source_type, last_sync_attempt, last_successful_sync, \
                   sync_count, error_count, last_error",
    )
    .bind(source_type)
    .bind(&now)
    .bind(success)
    .bind(&now)
    .bind(success)
    .bind(error)
    .bind(success)
    .bind(success)
    .bind(success)
    .fetch_one(pool)
    .await?;

    from_row(&row)
}

pub async fn get_sync_status(pool: &SqlitePool, source_type: &str) -> Result<Option<SyncStatus>> {
    let row = sqlx::query(
        "SELECT source_type, last_sync_attempt, last_successful_sync, \
                sync_count, error_count, last_error \
         FROM sync_status WHERE source_type = ?",
    )
    .bind(source_type)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list_sync_statuses(pool: &SqlitePool) -> Result<Vec<SyncStatus>> {
    let rows = sqlx::query(
        "SELECT source_type, last_sync_attempt, last_successful_sync, \
                sync_count, error_count, last_error \
         FROM sync_status ORDER BY source_type",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(from_row).collect()
}
