//! Taxonomy persistence: classification axes, their values, and the
//! many-to-many manual tag associations on talks.
//!
//! Tag mutations rebuild the affected talk's search vector in the same
//! transaction, since manual tag values feed the vector.

use crate::db::now_rfc3339;
use crate::db::talks::TalkStore;
use crate::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};

/// A named classification axis
#[derive(Debug, Clone, Serialize)]
pub struct Taxonomy {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_system: bool,
    pub values: Vec<TaxonomyValue>,
}

/// One allowed value within a taxonomy
#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyValue {
    pub id: i64,
    pub taxonomy_id: i64,
    pub value: String,
    pub description: String,
    pub color: String,
}

/// Usage counts for one taxonomy's values
#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyUsage {
    pub taxonomy_id: i64,
    pub taxonomy_name: String,
    pub total: i64,
    pub values: Vec<ValueUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueUsage {
    pub id: i64,
    pub value: String,
    pub count: i64,
}

/// A taxonomy value ranked by global usage
#[derive(Debug, Clone, Serialize)]
pub struct PopularTag {
    pub id: i64,
    pub value: String,
    pub taxonomy_id: i64,
    pub taxonomy_name: String,
    pub count: i64,
}

/// A talk's manual tags grouped by taxonomy
#[derive(Debug, Clone, Serialize)]
pub struct TagGroup {
    pub taxonomy_id: i64,
    pub taxonomy_name: String,
    pub values: Vec<TaxonomyValue>,
}

fn value_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TaxonomyValue> {
    Ok(TaxonomyValue {
        id: row.try_get("id")?,
        taxonomy_id: row.try_get("taxonomy_id")?,
        value: row.try_get("value")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Create a taxonomy; the name is unique case-insensitively
pub async fn create_taxonomy(
    pool: &SqlitePool,
    name: &str,
    description: &str,
    is_system: bool,
) -> Result<Taxonomy> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("taxonomy name is required".to_string()));
    }

    let result = sqlx::query(
        "INSERT INTO taxonomies (name, description, is_system, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(name.trim())
    .bind(description)
    .bind(is_system)
    .bind(now_rfc3339())
    .execute(pool)
    .await;

    let done = match result {
        Ok(done) => done,
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::InvalidInput(format!(
                "taxonomy '{}' already exists",
                name.trim()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Taxonomy {
        id: done.last_insert_rowid(),
        name: name.trim().to_string(),
        description: description.to_string(),
        is_system,
        values: Vec::new(),
    })
}

/// Update name/description of a taxonomy; Ok(None) when it does not exist
pub async fn update_taxonomy(
    pool: &SqlitePool,
    taxonomy_id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Taxonomy>> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("taxonomy name is required".to_string()));
        }
        let result = sqlx::query("UPDATE taxonomies SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(taxonomy_id)
            .execute(pool)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::InvalidInput(format!(
                    "taxonomy '{}' already exists",
                    name.trim()
                )))
            }
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(description) = description {
        sqlx::query("UPDATE taxonomies SET description = ? WHERE id = ?")
            .bind(description)
            .bind(taxonomy_id)
            .execute(pool)
            .await?;
    }

    get_taxonomy(pool, taxonomy_id).await
}

/// Delete a taxonomy; values and talk associations cascade with it
pub async fn delete_taxonomy(pool: &SqlitePool, taxonomy_id: i64) -> Result<bool> {
    let done = sqlx::query("DELETE FROM taxonomies WHERE id = ?")
        .bind(taxonomy_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

pub async fn get_taxonomy(pool: &SqlitePool, taxonomy_id: i64) -> Result<Option<Taxonomy>> {
    let row = sqlx::query("SELECT id, name, description, is_system FROM taxonomies WHERE id = ?")
        .bind(taxonomy_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else { return Ok(None) };

    let values = sqlx::query(
        "SELECT id, taxonomy_id, value, description, color FROM taxonomy_values \
         WHERE taxonomy_id = ? ORDER BY value",
    )
    .bind(taxonomy_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Taxonomy {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_system: row.try_get("is_system")?,
        values: values.iter().map(value_from_row).collect::<Result<_>>()?,
    }))
}

/// All taxonomies with their values, ordered by name
pub async fn list_taxonomies(pool: &SqlitePool) -> Result<Vec<Taxonomy>> {
    let rows =
        sqlx::query("SELECT id, name, description, is_system FROM taxonomies ORDER BY name")
            .fetch_all(pool)
            .await?;

    let mut taxonomies = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.try_get("id")?;
        let values = sqlx::query(
            "SELECT id, taxonomy_id, value, description, color FROM taxonomy_values \
             WHERE taxonomy_id = ? ORDER BY value",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        taxonomies.push(Taxonomy {
            id,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_system: row.try_get("is_system")?,
            values: values.iter().map(value_from_row).collect::<Result<_>>()?,
        });
    }
    Ok(taxonomies)
}

/// Create a value within a taxonomy; Ok(None) when the taxonomy is missing.
///
/// Value text is unique case-insensitively per taxonomy; creating an existing
/// value returns the existing row rather than failing.
pub async fn create_value(
    pool: &SqlitePool,
    taxonomy_id: i64,
    value: &str,
    description: &str,
    color: &str,
) -> Result<Option<TaxonomyValue>> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput("taxonomy value is required".to_string()));
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM taxonomies WHERE id = ?)")
        .bind(taxonomy_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Ok(None);
    }

    let result = sqlx::query(
        "INSERT INTO taxonomy_values (taxonomy_id, value, description, color, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(taxonomy_id)
    .bind(value.trim())
    .bind(description)
    .bind(color)
    .bind(now_rfc3339())
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(Some(TaxonomyValue {
            id: done.last_insert_rowid(),
            taxonomy_id,
            value: value.trim().to_string(),
            description: description.to_string(),
            color: color.to_string(),
        })),
        Err(e) if is_unique_violation(&e) => {
            let row = sqlx::query(
                "SELECT id, taxonomy_id, value, description, color FROM taxonomy_values \
                 WHERE taxonomy_id = ? AND value = ? COLLATE NOCASE",
            )
            .bind(taxonomy_id)
            .bind(value.trim())
            .fetch_one(pool)
            .await?;
            Ok(Some(value_from_row(&row)?))
        }
        Err(e) => Err(e.into()),
    }
}

/// Update a value's fields; Ok(None) when it does not exist
pub async fn update_value(
    pool: &SqlitePool,
    value_id: i64,
    value: Option<&str>,
    description: Option<&str>,
    color: Option<&str>,
) -> Result<Option<TaxonomyValue>> {
    if let Some(value) = value {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput("taxonomy value is required".to_string()));
        }
        let result = sqlx::query("UPDATE taxonomy_values SET value = ? WHERE id = ?")
            .bind(value.trim())
            .bind(value_id)
            .execute(pool)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::InvalidInput(format!(
                    "value '{}' already exists in this taxonomy",
                    value.trim()
                )))
            }
            Err(e) => return Err(e.into()),
        }
    }
    if let Some(description) = description {
        sqlx::query("UPDATE taxonomy_values SET description = ? WHERE id = ?")
            .bind(description)
            .bind(value_id)
            .execute(pool)
            .await?;
    }
    if let Some(color) = color {
        sqlx::query("UPDATE taxonomy_values SET color = ? WHERE id = ?")
            .bind(color)
            .bind(value_id)
            .execute(pool)
            .await?;
    }

    let row = sqlx::query(
        "SELECT id, taxonomy_id, value, description, color FROM taxonomy_values WHERE id = ?",
    )
    .bind(value_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(value_from_row).transpose()
}

/// Delete a value; talk associations cascade with it
pub async fn delete_value(pool: &SqlitePool, value_id: i64) -> Result<bool> {
    let done = sqlx::query("DELETE FROM taxonomy_values WHERE id = ?")
        .bind(value_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

/// Resolve taxonomy-name → value-text filters to value IDs.
///
/// Matching is case-insensitive on both name and value. Pairs with no match
/// contribute nothing; the result is the de-duplicated, sorted union. The
/// caller decides what an empty union on an explicit filter means.
pub async fn resolve_value_ids(
    pool: &SqlitePool,
    filters: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<i64>> {
    let mut ids = BTreeSet::new();

    for (taxonomy_name, values) in filters {
        if values.is_empty() {
            continue;
        }
        let placeholders = vec!["LOWER(?)"; values.len()].join(", ");
        let sql = format!(
            "SELECT v.id FROM taxonomy_values v \
             JOIN taxonomies t ON v.taxonomy_id = t.id \
             WHERE LOWER(t.name) = LOWER(?) AND LOWER(v.value) IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(taxonomy_name);
        for value in values {
            query = query.bind(value);
        }
        let rows = query.fetch_all(pool).await?;
        for row in &rows {
            ids.insert(row.try_get::<i64, _>("id")?);
        }
    }

    Ok(ids.into_iter().collect())
}

/// Usage counts per value, grouped by taxonomy; zero-usage values included
pub async fn usage_counts(
    pool: &SqlitePool,
    taxonomy_id: Option<i64>,
) -> Result<Vec<TaxonomyUsage>> {
    let mut sql = String::from(
        "SELECT t.id AS taxonomy_id, t.name AS taxonomy_name, \
                v.id AS value_id, v.value AS value, \
                COUNT(tt.talk_id) AS usage_count \
         FROM taxonomies t \
         JOIN taxonomy_values v ON v.taxonomy_id = t.id \
         LEFT JOIN talk_taxonomies tt ON tt.taxonomy_value_id = v.id",
    );
    if taxonomy_id.is_some() {
        sql.push_str(" WHERE t.id = ?");
    }
    sql.push_str(
        " GROUP BY t.id, t.name, v.id, v.value \
          ORDER BY t.name ASC, COUNT(tt.talk_id) DESC, v.value ASC",
    );

    let mut query = sqlx::query(&sql);
    if let Some(id) = taxonomy_id {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;

    let mut grouped: Vec<TaxonomyUsage> = Vec::new();
    for row in &rows {
        let tid: i64 = row.try_get("taxonomy_id")?;
        let count: i64 = row.try_get("usage_count")?;
        if grouped.last().map(|g| g.taxonomy_id) != Some(tid) {
            grouped.push(TaxonomyUsage {
                taxonomy_id: tid,
                taxonomy_name: row.try_get("taxonomy_name")?,
                total: 0,
                values: Vec::new(),
            });
        }
        if let Some(group) = grouped.last_mut() {
            group.total += count;
            group.values.push(ValueUsage {
                id: row.try_get("value_id")?,
                value: row.try_get("value")?,
                count,
            });
        }
    }
    Ok(grouped)
}

/// Top taxonomy values by global usage; ties break by value text ascending
pub async fn most_popular(pool: &SqlitePool, limit: i64) -> Result<Vec<PopularTag>> {
    let rows = sqlx::query(
        "SELECT v.id AS value_id, v.value AS value, \
                t.id AS taxonomy_id, t.name AS taxonomy_name, \
                COUNT(tt.talk_id) AS usage_count \
         FROM taxonomy_values v \
         JOIN taxonomies t ON v.taxonomy_id = t.id \
         LEFT JOIN talk_taxonomies tt ON tt.taxonomy_value_id = v.id \
         GROUP BY v.id, v.value, t.id, t.name \
         ORDER BY COUNT(tt.talk_id) DESC, v.value ASC \
         LIMIT ?",
    )
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PopularTag {
                id: row.try_get("value_id")?,
                value: row.try_get("value")?,
                taxonomy_id: row.try_get("taxonomy_id")?,
                taxonomy_name: row.try_get("taxonomy_name")?,
                count: row.try_get("usage_count")?,
            })
        })
        .collect()
}

/// A talk's manual tags grouped by taxonomy; Ok(None) when the talk is missing
pub async fn talk_tags(pool: &SqlitePool, talk_id: &str) -> Result<Option<Vec<TagGroup>>> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM talks WHERE id = ?)")
        .bind(talk_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Ok(None);
    }

    let rows = sqlx::query(
        "SELECT t.id AS taxonomy_id, t.name AS taxonomy_name, \
                v.id, v.taxonomy_id AS value_taxonomy_id, v.value, v.description, v.color \
         FROM talk_taxonomies tt \
         JOIN taxonomy_values v ON tt.taxonomy_value_id = v.id \
         JOIN taxonomies t ON v.taxonomy_id = t.id \
         WHERE tt.talk_id = ? \
         ORDER BY t.name, v.value",
    )
    .bind(talk_id)
    .fetch_all(pool)
    .await?;

    let mut groups: Vec<TagGroup> = Vec::new();
    for row in &rows {
        let tid: i64 = row.try_get("taxonomy_id")?;
        if groups.last().map(|g| g.taxonomy_id) != Some(tid) {
            groups.push(TagGroup {
                taxonomy_id: tid,
                taxonomy_name: row.try_get("taxonomy_name")?,
                values: Vec::new(),
            });
        }
        if let Some(group) = groups.last_mut() {
            group.values.push(TaxonomyValue {
                id: row.try_get("id")?,
                taxonomy_id: row.try_get("value_taxonomy_id")?,
                value: row.try_get("value")?,
                description: row.try_get("description")?,
                color: row.try_get("color")?,
            });
        }
    }
    Ok(Some(groups))
}

async fn require_talk(conn: &mut SqliteConnection, talk_id: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM talks WHERE id = ?)")
        .bind(talk_id)
        .fetch_one(conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(Error::NotFound(format!("talk {}", talk_id)))
    }
}

async fn require_values(conn: &mut SqliteConnection, value_ids: &[i64]) -> Result<()> {
    for id in value_ids {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM taxonomy_values WHERE id = ?)")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;
        if !exists {
            return Err(Error::NotFound(format!("taxonomy value {}", id)));
        }
    }
    Ok(())
}

/// Add tags to a talk (union with existing)
pub async fn add_tags(store: &TalkStore, talk_id: &str, value_ids: &[i64]) -> Result<()> {
    let mut tx = store.pool().begin().await?;
    require_talk(&mut tx, talk_id).await?;
    require_values(&mut tx, value_ids).await?;

    for id in value_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO talk_taxonomies (talk_id, taxonomy_value_id, created_at) \
             VALUES (?, ?, ?)",
        )
        .bind(talk_id)
        .bind(id)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    store.rebuild_vector_in_tx(&mut tx, talk_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Replace a talk's tags with exactly the given set
pub async fn replace_tags(store: &TalkStore, talk_id: &str, value_ids: &[i64]) -> Result<()> {
    let mut tx = store.pool().begin().await?;
    require_talk(&mut tx, talk_id).await?;
    require_values(&mut tx, value_ids).await?;

    sqlx::query("DELETE FROM talk_taxonomies WHERE talk_id = ?")
        .bind(talk_id)
        .execute(&mut *tx)
        .await?;
    for id in value_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO talk_taxonomies (talk_id, taxonomy_value_id, created_at) \
             VALUES (?, ?, ?)",
        )
        .bind(talk_id)
        .bind(id)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    store.rebuild_vector_in_tx(&mut tx, talk_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Remove one tag from a talk; removing an absent association is a no-op
pub async fn remove_tag(store: &TalkStore, talk_id: &str, value_id: i64) -> Result<()> {
    let mut tx = store.pool().begin().await?;
    require_talk(&mut tx, talk_id).await?;
    require_values(&mut tx, &[value_id]).await?;

    sqlx::query("DELETE FROM talk_taxonomies WHERE talk_id = ? AND taxonomy_value_id = ?")
        .bind(talk_id)
        .bind(value_id)
        .execute(&mut *tx)
        .await?;

    store.rebuild_vector_in_tx(&mut tx, talk_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Seed the built-in taxonomies on first start; idempotent
pub async fn seed_default_taxonomies(pool: &SqlitePool) -> Result<()> {
    let defaults: [(&str, &str, &[(&str, &str, &str)]); 2] = [
        (
            "difficulty",
            "Talk difficulty level",
            &[
                ("beginner", "Suitable for beginners", "#4CAF50"),
                ("intermediate", "Some experience required", "#FF9800"),
                ("advanced", "Deep prior knowledge required", "#F44336"),
            ],
        ),
        (
            "topic",
            "Main topic areas",
            &[
                ("web-development", "Web frameworks and development", "#2196F3"),
                ("data-science", "Data analysis and machine learning", "#9C27B0"),
                ("testing", "Testing frameworks and practices", "#607D8B"),
                ("devops", "Deployment and infrastructure", "#795548"),
                ("ai-ml", "Artificial intelligence and machine learning", "#E91E63"),
            ],
        ),
    ];

    for (name, description, values) in defaults {
        let taxonomy = match create_taxonomy(pool, name, description, true).await {
            Ok(t) => t,
            Err(Error::InvalidInput(_)) => continue, // already seeded
            Err(e) => return Err(e),
        };
        for (value, value_description, color) in values {
            create_value(pool, taxonomy.id, value, value_description, color).await?;
        }
    }
    Ok(())
}
