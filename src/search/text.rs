//! Text search strategies
//!
//! The store works against SQLite in every deployment, but the text-search
//! capability differs: builds with FTS5 get token matching through a shadow
//! index, builds without it fall back to case-insensitive substring matching
//! over the derived search vector. The strategy is probed once at startup
//! instead of branching per query. The fallback is deliberately at least as
//! inclusive as the indexed path for plain substring queries.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Bind argument for dynamically assembled SQL
#[derive(Debug, Clone)]
pub enum SqlArg {
    Text(String),
    Int(i64),
}

/// A SQL fragment plus its bind arguments
pub type SqlFragment = (String, Vec<SqlArg>);

/// Dialect-aware free-text predicate over the talks table (aliased `t`)
pub trait TextSearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// WHERE fragment restricting `t` to rows matching `query`
    fn predicate(&self, query: &str) -> SqlFragment;

    /// Statements keeping any side index in step with a talk row write
    fn reindex_statements(&self, talk_id: &str, body: &str) -> Vec<SqlFragment> {
        let _ = (talk_id, body);
        Vec::new()
    }
}

/// Case-insensitive LIKE over search_vector, title, and description
pub struct SubstringTextSearch;

impl TextSearchStrategy for SubstringTextSearch {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn predicate(&self, query: &str) -> SqlFragment {
        substring_predicate(query)
    }
}

fn substring_predicate(query: &str) -> SqlFragment {
    let like = format!("%{}%", query.trim().to_lowercase());
    (
        "(LOWER(t.search_vector) LIKE ? OR LOWER(t.title) LIKE ? OR LOWER(t.description) LIKE ?)"
            .to_string(),
        vec![
            SqlArg::Text(like.clone()),
            SqlArg::Text(like.clone()),
            SqlArg::Text(like),
        ],
    )
}

/// Token matching via an FTS5 shadow table over the search vector
pub struct Fts5TextSearch;

impl Fts5TextSearch {
    /// Reduce raw user text to quoted FTS terms, stripping operator syntax
    fn match_expression(query: &str) -> Option<String> {
        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t.to_lowercase()))
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        }
    }
}

impl TextSearchStrategy for Fts5TextSearch {
    fn name(&self) -> &'static str {
        "fts5"
    }

    fn predicate(&self, query: &str) -> SqlFragment {
        match Self::match_expression(query) {
            Some(expr) => (
                "t.id IN (SELECT talk_id FROM talks_fts WHERE body MATCH ?)".to_string(),
                vec![SqlArg::Text(expr)],
            ),
            // Nothing indexable in the query (punctuation only); degrade to
            // substring matching rather than matching nothing.
            None => substring_predicate(query),
        }
    }

    fn reindex_statements(&self, talk_id: &str, body: &str) -> Vec<SqlFragment> {
        vec![
            (
                "DELETE FROM talks_fts WHERE talk_id = ?".to_string(),
                vec![SqlArg::Text(talk_id.to_string())],
            ),
            (
                "INSERT INTO talks_fts (talk_id, body) VALUES (?, ?)".to_string(),
                vec![
                    SqlArg::Text(talk_id.to_string()),
                    SqlArg::Text(body.to_string()),
                ],
            ),
        ]
    }
}

/// Probe the SQLite build for FTS5 and pick the matching strategy.
///
/// When FTS5 is available the shadow table is created and backfilled for any
/// talks written under the substring strategy.
pub async fn select_strategy(pool: &SqlitePool) -> Arc<dyn TextSearchStrategy> {
    let created = sqlx::query(
        "CREATE VIRTUAL TABLE IF NOT EXISTS talks_fts USING fts5(talk_id UNINDEXED, body)",
    )
    .execute(pool)
    .await;

    match created {
        Ok(_) => {
            let backfill = sqlx::query(
                r#"
                INSERT INTO talks_fts (talk_id, body)
                SELECT id, search_vector FROM talks
                WHERE id NOT IN (SELECT talk_id FROM talks_fts)
                "#,
            )
            .execute(pool)
            .await;

            match backfill {
                Ok(_) => {
                    info!("Text search strategy: fts5");
                    Arc::new(Fts5TextSearch)
                }
                Err(e) => {
                    warn!("FTS5 backfill failed ({}); falling back to substring search", e);
                    Arc::new(SubstringTextSearch)
                }
            }
        }
        Err(e) => {
            info!("FTS5 unavailable ({}); using substring search", e);
            Arc::new(SubstringTextSearch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_expression_quotes_and_lowercases_terms() {
        assert_eq!(
            Fts5TextSearch::match_expression("Async Rust"),
            Some("\"async\" \"rust\"".to_string())
        );
    }

    #[test]
    fn fts_expression_strips_operator_syntax() {
        assert_eq!(
            Fts5TextSearch::match_expression("web* OR \"sql\" -x"),
            Some("\"web\" \"or\" \"sql\" \"x\"".to_string())
        );
    }

    #[test]
    fn punctuation_only_query_degrades_to_substring() {
        let (sql, args) = Fts5TextSearch.predicate("!!!");
        assert!(sql.contains("LIKE"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn substring_predicate_covers_vector_title_description() {
        let (sql, args) = SubstringTextSearch.predicate("Python");
        assert!(sql.contains("t.search_vector"));
        assert!(sql.contains("t.title"));
        assert!(sql.contains("t.description"));
        match &args[0] {
            SqlArg::Text(s) => assert_eq!(s, "%python%"),
            other => panic!("unexpected arg: {:?}", other),
        }
    }

    #[test]
    fn substring_strategy_maintains_no_index() {
        assert!(SubstringTextSearch.reindex_statements("x", "y").is_empty());
    }

    #[test]
    fn fts_strategy_replaces_index_row() {
        let stmts = Fts5TextSearch.reindex_statements("t1", "rust talk");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].0.starts_with("DELETE"));
        assert!(stmts[1].0.starts_with("INSERT"));
    }
}
