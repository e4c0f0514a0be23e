//! Database initialization and stores
//!
//! Schema is created idempotently on startup; the service owns its SQLite
//! file and never requires out-of-band migrations.

pub mod sync_status;
pub mod talks;
pub mod taxonomies;

use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enforce referential integrity; taxonomy deletes cascade through
    // taxonomy_values into talk_taxonomies.
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while a sync run writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_talks_table(&pool).await?;
    create_taxonomies_table(&pool).await?;
    create_taxonomy_values_table(&pool).await?;
    create_talk_taxonomies_table(&pool).await?;
    create_sync_status_table(&pool).await?;

    Ok(pool)
}

/// Current time as stored in TEXT timestamp columns
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored TEXT timestamp; malformed values read as absent
pub(crate) fn parse_rfc3339(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

async fn create_talks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS talks (
            id TEXT PRIMARY KEY,
            talk_type TEXT NOT NULL DEFAULT 'talk',
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            speaker_names TEXT NOT NULL DEFAULT '[]',
            source_type TEXT,
            source_id TEXT,
            source_url TEXT,
            auto_tags TEXT NOT NULL DEFAULT '[]',
            type_specific_data TEXT NOT NULL DEFAULT '{}',
            search_vector TEXT NOT NULL DEFAULT '',
            last_synced TEXT,
            source_updated_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (length(id) > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Source identity is unique only when both halves are present; this index
    // also backs the per-record upsert in the reconciler.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_talks_source
        ON talks(source_type, source_id)
        WHERE source_type IS NOT NULL AND source_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_talks_type ON talks(talk_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_talks_created_at ON talks(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_taxonomies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS taxonomies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL COLLATE NOCASE UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            is_system INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_taxonomy_values_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS taxonomy_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            taxonomy_id INTEGER NOT NULL REFERENCES taxonomies(id) ON DELETE CASCADE,
            value TEXT NOT NULL COLLATE NOCASE,
            description TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE (taxonomy_id, value)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_taxonomy_values_taxonomy ON taxonomy_values(taxonomy_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_talk_taxonomies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS talk_taxonomies (
            talk_id TEXT NOT NULL REFERENCES talks(id) ON DELETE CASCADE,
            taxonomy_value_id INTEGER NOT NULL REFERENCES taxonomy_values(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (talk_id, taxonomy_value_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_talk_taxonomies_value ON talk_taxonomies(taxonomy_value_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sync_status_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_status (
            source_type TEXT PRIMARY KEY,
            last_sync_attempt TEXT,
            last_successful_sync TEXT,
            sync_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            CHECK (sync_count >= 0),
            CHECK (error_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
