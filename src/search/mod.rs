//! Catalog search: dynamic filtering, counting, and pagination over talks.

pub mod text;
pub mod vector;

use crate::db::talks::Talk;
use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use text::{SqlArg, TextSearchStrategy};

/// How multiple taxonomy value filters combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Talk carries at least one of the values
    #[default]
    Any,
    /// Talk carries every one of the values
    All,
}

/// Taxonomy filter state, distinguishing "no filter" from a filter that
/// resolved to nothing (which must match no talks).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagFilter {
    #[default]
    Unfiltered,
    Values(Vec<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub talk_types: Vec<String>,
    pub tags: TagFilter,
    pub match_mode: MatchMode,
    pub sort_by: String,
    pub sort_dir: SortDir,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            talk_types: Vec::new(),
            tags: TagFilter::Unfiltered,
            match_mode: MatchMode::Any,
            sort_by: "created_at".to_string(),
            sort_dir: SortDir::Desc,
            limit: 50,
            offset: 0,
        }
    }
}

/// One page of results plus the total match count before paging
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub items: Vec<Talk>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Columns a caller may sort by; anything else falls back to created_at
const SORTABLE_COLUMNS: [&str; 5] =
    ["created_at", "updated_at", "title", "talk_type", "last_synced"];

fn sort_column(requested: &str) -> &'static str {
    SORTABLE_COLUMNS
        .iter()
        .find(|c| **c == requested)
        .copied()
        .unwrap_or("created_at")
}

#[derive(Clone)]
pub struct SearchEngine {
    pool: SqlitePool,
    text_search: Arc<dyn TextSearchStrategy>,
}

impl SearchEngine {
    pub fn new(pool: SqlitePool, text_search: Arc<dyn TextSearchStrategy>) -> Self {
        Self { pool, text_search }
    }

    /// Run a catalog search: count all matches, then fetch one page.
    ///
    /// A query of the form `id:<talk-id>` bypasses all other filters and
    /// looks the talk up directly.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        if let Some(query) = &request.query {
            if let Some(id) = query.trim().strip_prefix("id:") {
                return self.lookup_by_id(id.trim(), request).await;
            }
        }

        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<SqlArg> = Vec::new();

        if let Some(query) = &request.query {
            if !query.trim().is_empty() {
                let (sql, mut predicate_args) = self.text_search.predicate(query);
                clauses.push(sql);
                args.append(&mut predicate_args);
            }
        }

        if !request.talk_types.is_empty() {
            let placeholders = vec!["?"; request.talk_types.len()].join(", ");
            clauses.push(format!("t.talk_type IN ({})", placeholders));
            for talk_type in &request.talk_types {
                args.push(SqlArg::Text(talk_type.clone()));
            }
        }

        if let TagFilter::Values(ids) = &request.tags {
            let mut ids: Vec<i64> = ids.clone();
            ids.sort_unstable();
            ids.dedup();
            if ids.is_empty() {
                // explicit filter that resolved to nothing matches no talks
                clauses.push("1 = 0".to_string());
            } else {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let clause = match request.match_mode {
                    MatchMode::Any => format!(
                        "t.id IN (SELECT talk_id FROM talk_taxonomies \
                         WHERE taxonomy_value_id IN ({}))",
                        placeholders
                    ),
                    MatchMode::All => format!(
                        "t.id IN (SELECT talk_id FROM talk_taxonomies \
                         WHERE taxonomy_value_id IN ({}) \
                         GROUP BY talk_id \
                         HAVING COUNT(DISTINCT taxonomy_value_id) = ?)",
                        placeholders
                    ),
                };
                clauses.push(clause);
                let count = ids.len() as i64;
                for id in ids {
                    args.push(SqlArg::Int(id));
                }
                if request.match_mode == MatchMode::All {
                    args.push(SqlArg::Int(count));
                }
            }
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM talks t{}", where_sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_query = match arg {
                SqlArg::Text(s) => count_query.bind(s.clone()),
                SqlArg::Int(i) => count_query.bind(*i),
            };
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let limit = request.limit.clamp(1, 200);
        let offset = request.offset.max(0);
        let direction = match request.sort_dir {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        };
        let page_sql = format!(
            "SELECT t.* FROM talks t{} ORDER BY t.{} {}, t.id ASC LIMIT ? OFFSET ?",
            where_sql,
            sort_column(&request.sort_by),
            direction
        );
        let mut page_query = sqlx::query(&page_sql);
        for arg in &args {
            page_query = match arg {
                SqlArg::Text(s) => page_query.bind(s.clone()),
                SqlArg::Int(i) => page_query.bind(*i),
            };
        }
        let rows = page_query.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        Ok(SearchPage {
            items: rows.iter().map(Talk::from_row).collect::<Result<_>>()?,
            total,
            limit,
            offset,
        })
    }

    async fn lookup_by_id(&self, id: &str, request: &SearchRequest) -> Result<SearchPage> {
        let row = sqlx::query("SELECT t.* FROM talks t WHERE t.id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let items = match row {
            Some(row) => vec![Talk::from_row(&row)?],
            None => Vec::new(),
        };
        Ok(SearchPage {
            total: items.len() as i64,
            items,
            limit: request.limit.clamp(1, 200),
            offset: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_allows_known_columns() {
        assert_eq!(sort_column("updated_at"), "updated_at");
        assert_eq!(sort_column("title"), "title");
        assert_eq!(sort_column("last_synced"), "last_synced");
    }

    #[test]
    fn sort_column_falls_back_for_unknown_input() {
        assert_eq!(sort_column("speaker_names"), "created_at");
        assert_eq!(sort_column("title; DROP TABLE talks"), "created_at");
        assert_eq!(sort_column(""), "created_at");
    }

    #[test]
    fn match_mode_defaults_to_any() {
        assert_eq!(MatchMode::default(), MatchMode::Any);
        let mode: MatchMode = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(mode, MatchMode::All);
    }

    #[test]
    fn default_request_pages_newest_first() {
        let request = SearchRequest::default();
        assert_eq!(request.sort_by, "created_at");
        assert_eq!(request.sort_dir, SortDir::Desc);
        assert_eq!(request.limit, 50);
        assert_eq!(request.tags, TagFilter::Unfiltered);
    }
}
