//! Talk persistence
//!
//! All writes run the derived search vector through the builder and keep the
//! text-search side index (when one exists) in step, inside the caller's
//! transaction.

use crate::db::{now_rfc3339, parse_rfc3339};
use crate::search::text::{SqlArg, SqlFragment, TextSearchStrategy};
use crate::search::vector::build_search_vector;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// A catalogued talk
#[derive(Debug, Clone, Serialize)]
pub struct Talk {
    pub id: String,
    pub talk_type: String,
    pub title: String,
    pub description: String,
    pub speaker_names: Vec<String>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub source_url: Option<String>,
    pub auto_tags: Vec<String>,
    pub type_specific_data: serde_json::Value,
    pub search_vector: String,
    pub last_synced: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Talk {
    /// New talk with a fresh identity and current timestamps
    pub fn new(title: String, description: String, talk_type: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            talk_type,
            title,
            description,
            speaker_names: Vec::new(),
            source_type: None,
            source_id: None,
            source_url: None,
            auto_tags: Vec::new(),
            type_specific_data: serde_json::json!({}),
            search_vector: String::new(),
            last_synced: None,
            source_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let speaker_names: String = row.try_get("speaker_names")?;
        let auto_tags: String = row.try_get("auto_tags")?;
        let type_specific_data: String = row.try_get("type_specific_data")?;

        Ok(Self {
            id: row.try_get("id")?,
            talk_type: row.try_get("talk_type")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            speaker_names: serde_json::from_str(&speaker_names).unwrap_or_default(),
            source_type: row.try_get("source_type")?,
            source_id: row.try_get("source_id")?,
            source_url: row.try_get("source_url")?,
            auto_tags: serde_json::from_str(&auto_tags).unwrap_or_default(),
            type_specific_data: serde_json::from_str(&type_specific_data)
                .unwrap_or_else(|_| serde_json::json!({})),
            search_vector: row.try_get("search_vector")?,
            last_synced: parse_rfc3339(row.try_get("last_synced")?),
            source_updated_at: parse_rfc3339(row.try_get("source_updated_at")?),
            created_at: parse_rfc3339(row.try_get("created_at")?).unwrap_or_else(Utc::now),
            updated_at: parse_rfc3339(row.try_get("updated_at")?).unwrap_or_else(Utc::now),
        })
    }
}

/// Execute a dynamically assembled statement on a connection
pub(crate) async fn execute_fragment(
    conn: &mut SqliteConnection,
    fragment: &SqlFragment,
) -> Result<()> {
    let (sql, args) = fragment;
    let mut query = sqlx::query(sql);
    for arg in args {
        query = match arg {
            SqlArg::Text(s) => query.bind(s.as_str()),
            SqlArg::Int(i) => query.bind(*i),
        };
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

/// Talk store: row persistence plus search-vector and index upkeep
#[derive(Clone)]
pub struct TalkStore {
    pool: SqlitePool,
    text_search: Arc<dyn TextSearchStrategy>,
}

impl TalkStore {
    pub fn new(pool: SqlitePool, text_search: Arc<dyn TextSearchStrategy>) -> Self {
        Self { pool, text_search }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get(&self, talk_id: &str) -> Result<Option<Talk>> {
        let row = sqlx::query("SELECT * FROM talks WHERE id = ?")
            .bind(talk_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Talk::from_row).transpose()
    }

    /// Lookup inside a transaction, used by handlers that follow up with a write
    pub async fn get_in_tx(conn: &mut SqliteConnection, talk_id: &str) -> Result<Option<Talk>> {
        let row = sqlx::query("SELECT * FROM talks WHERE id = ?")
            .bind(talk_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(Talk::from_row).transpose()
    }

    /// Lookup by source identity; must run on the same connection as the
    /// write that follows it (check-then-act within one transaction)
    pub async fn get_by_source(
        conn: &mut SqliteConnection,
        source_type: &str,
        source_id: &str,
    ) -> Result<Option<Talk>> {
        let row = sqlx::query("SELECT * FROM talks WHERE source_type = ? AND source_id = ?")
            .bind(source_type)
            .bind(source_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(Talk::from_row).transpose()
    }

    /// Manual tag values attached to a talk, for search vector derivation
    pub async fn manual_tag_values(
        conn: &mut SqliteConnection,
        talk_id: &str,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT v.value FROM taxonomy_values v
            JOIN talk_taxonomies tt ON tt.taxonomy_value_id = v.id
            WHERE tt.talk_id = ?
            ORDER BY v.value
            "#,
        )
        .bind(talk_id)
        .fetch_all(conn)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("value").map_err(Into::into))
            .collect()
    }

    /// Insert a talk, deriving its search vector; runs in the caller's transaction
    pub async fn insert_in_tx(&self, conn: &mut SqliteConnection, talk: &mut Talk) -> Result<()> {
        // A new row cannot have manual tags yet
        talk.search_vector = build_search_vector(talk, &[]);

        sqlx::query(
            r#"
            INSERT INTO talks (
                id, talk_type, title, description, speaker_names,
                source_type, source_id, source_url, auto_tags,
                type_specific_data, search_vector, last_synced,
                source_updated_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&talk.id)
        .bind(&talk.talk_type)
        .bind(&talk.title)
        .bind(&talk.description)
        .bind(serde_json::to_string(&talk.speaker_names)?)
        .bind(&talk.source_type)
        .bind(&talk.source_id)
        .bind(&talk.source_url)
        .bind(serde_json::to_string(&talk.auto_tags)?)
        .bind(serde_json::to_string(&talk.type_specific_data)?)
        .bind(&talk.search_vector)
        .bind(talk.last_synced.map(|d| d.to_rfc3339()))
        .bind(talk.source_updated_at.map(|d| d.to_rfc3339()))
        .bind(talk.created_at.to_rfc3339())
        .bind(talk.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        for stmt in self
            .text_search
            .reindex_statements(&talk.id, &talk.search_vector)
        {
            execute_fragment(conn, &stmt).await?;
        }

        Ok(())
    }

    /// Rewrite a talk row, rebuilding the search vector from current fields
    /// and manual tags; runs in the caller's transaction
    pub async fn update_in_tx(&self, conn: &mut SqliteConnection, talk: &mut Talk) -> Result<()> {
        let manual_tags = Self::manual_tag_values(conn, &talk.id).await?;
        talk.updated_at = Utc::now();
        talk.search_vector = build_search_vector(talk, &manual_tags);

        sqlx::query(
            r#"
            UPDATE talks SET
                talk_type = ?, title = ?, description = ?, speaker_names = ?,
                source_type = ?, source_id = ?, source_url = ?, auto_tags = ?,
                type_specific_data = ?, search_vector = ?, last_synced = ?,
                source_updated_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&talk.talk_type)
        .bind(&talk.title)
        .bind(&talk.description)
        .bind(serde_json::to_string(&talk.speaker_names)?)
        .bind(&talk.source_type)
        .bind(&talk.source_id)
        .bind(&talk.source_url)
        .bind(serde_json::to_string(&talk.auto_tags)?)
        .bind(serde_json::to_string(&talk.type_specific_data)?)
        .bind(&talk.search_vector)
        .bind(talk.last_synced.map(|d| d.to_rfc3339()))
        .bind(talk.source_updated_at.map(|d| d.to_rfc3339()))
        .bind(talk.updated_at.to_rfc3339())
        .bind(&talk.id)
        .execute(&mut *conn)
        .await?;

        for stmt in self
            .text_search
            .reindex_statements(&talk.id, &talk.search_vector)
        {
            execute_fragment(conn, &stmt).await?;
        }

        Ok(())
    }

    /// Create a talk in its own transaction (manual entry path)
    pub async fn create(&self, talk: &mut Talk) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_in_tx(&mut tx, talk).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rebuild a talk's search vector after its manual tags changed.
    ///
    /// Returns false when the talk does not exist.
    pub async fn rebuild_vector_in_tx(
        &self,
        conn: &mut SqliteConnection,
        talk_id: &str,
    ) -> Result<bool> {
        let Some(talk) = Self::get_in_tx(conn, talk_id).await? else {
            return Ok(false);
        };

        let manual_tags = Self::manual_tag_values(conn, talk_id).await?;
        let vector = build_search_vector(&talk, &manual_tags);

        sqlx::query("UPDATE talks SET search_vector = ?, updated_at = ? WHERE id = ?")
            .bind(&vector)
            .bind(now_rfc3339())
            .bind(talk_id)
            .execute(&mut *conn)
            .await?;

        for stmt in self.text_search.reindex_statements(talk_id, &vector) {
            execute_fragment(conn, &stmt).await?;
        }

        Ok(true)
    }

    /// Distinct talk types in the catalog, sorted
    pub async fn list_types(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT talk_type FROM talks WHERE talk_type != '' ORDER BY talk_type",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("talk_type").map_err(Into::into))
            .collect()
    }
}
