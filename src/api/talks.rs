//! Talk catalog endpoints: search, lookup, creation, and manual tagging.

use crate::api::{ApiError, ApiResult};
use crate::db::talks::Talk;
use crate::db::taxonomies::{self, TagGroup};
use crate::search::{MatchMode, SearchPage, SearchRequest, SortDir, TagFilter};
use crate::{AppState, Error};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    /// Comma-separated talk types
    pub types: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<SortDir>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn split_comma_list(input: Option<&str>) -> Vec<String> {
    input
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// GET /api/talks
pub async fn list_talks(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<SearchPage>> {
    let mut request = SearchRequest {
        query: params.q,
        talk_types: split_comma_list(params.types.as_deref()),
        ..SearchRequest::default()
    };
    if let Some(sort) = params.sort {
        request.sort_by = sort;
    }
    if let Some(dir) = params.dir {
        request.sort_dir = dir;
    }
    if let Some(limit) = params.limit {
        request.limit = limit;
    }
    if let Some(offset) = params.offset {
        request.offset = offset;
    }

    let page = state.search.search(&request).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AdvancedSearchRequest {
    pub query: Option<String>,
    pub talk_types: Vec<String>,
    /// Explicit taxonomy value IDs to filter by
    pub taxonomy_value_ids: Option<Vec<i64>>,
    /// Taxonomy-name to value-text filters, resolved case-insensitively
    pub taxonomy_filters: Option<BTreeMap<String, Vec<String>>>,
    pub match_mode: MatchMode,
    pub sort_by: Option<String>,
    pub sort_dir: SortDir,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /api/talks/search
pub async fn advanced_search(
    State(state): State<AppState>,
    Json(body): Json<AdvancedSearchRequest>,
) -> ApiResult<Json<SearchPage>> {
    // An explicit filter that resolves to nothing must match no talks,
    // so only the absence of both fields means unfiltered.
    let tags = match (&body.taxonomy_value_ids, &body.taxonomy_filters) {
        (None, None) => TagFilter::Unfiltered,
        (ids, filters) => {
            let mut union: BTreeSet<i64> = ids.clone().unwrap_or_default().into_iter().collect();
            if let Some(filters) = filters {
                let resolved =
                    taxonomies::resolve_value_ids(state.store.pool(), filters).await?;
                union.extend(resolved);
            }
            TagFilter::Values(union.into_iter().collect())
        }
    };

    let mut request = SearchRequest {
        query: body.query,
        talk_types: body.talk_types,
        tags,
        match_mode: body.match_mode,
        sort_dir: body.sort_dir,
        ..SearchRequest::default()
    };
    if let Some(sort_by) = body.sort_by {
        request.sort_by = sort_by;
    }
    if let Some(limit) = body.limit {
        request.limit = limit;
    }
    if let Some(offset) = body.offset {
        request.offset = offset;
    }

    let page = state.search.search(&request).await?;
    Ok(Json(page))
}

/// GET /api/talks/types
pub async fn list_types(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.store.list_types().await?))
}

/// GET /api/talks/:id
pub async fn get_talk(
    State(state): State<AppState>,
    Path(talk_id): Path<String>,
) -> ApiResult<Json<Talk>> {
    let talk = state
        .store
        .get(&talk_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("talk {}", talk_id)))?;
    Ok(Json(talk))
}

#[derive(Debug, Deserialize)]
pub struct CreateTalkRequest {
    pub title: String,
    pub description: String,
    pub talk_type: String,
    #[serde(default)]
    pub speaker_names: Vec<String>,
    #[serde(default)]
    pub type_specific_data: Option<serde_json::Value>,
}

/// POST /api/talks
pub async fn create_talk(
    State(state): State<AppState>,
    Json(body): Json<CreateTalkRequest>,
) -> ApiResult<(StatusCode, Json<Talk>)> {
    if body.title.trim().is_empty() {
        return Err(ApiError::from(Error::InvalidInput(
            "title is required".to_string(),
        )));
    }
    if body.talk_type.trim().is_empty() {
        return Err(ApiError::from(Error::InvalidInput(
            "talk_type is required".to_string(),
        )));
    }

    let mut talk = Talk::new(
        body.title.trim().to_string(),
        body.description,
        body.talk_type.trim().to_string(),
    );
    talk.speaker_names = body.speaker_names;
    if let Some(data) = body.type_specific_data {
        talk.type_specific_data = data;
    }
    talk.auto_tags = state.classifier.classify(&talk.title, &talk.description);

    state.store.create(&mut talk).await?;
    Ok((StatusCode::CREATED, Json(talk)))
}

/// GET /api/talks/:id/tags
pub async fn get_talk_tags(
    State(state): State<AppState>,
    Path(talk_id): Path<String>,
) -> ApiResult<Json<Vec<TagGroup>>> {
    let groups = taxonomies::talk_tags(state.store.pool(), &talk_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("talk {}", talk_id)))?;
    Ok(Json(groups))
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub taxonomy_value_ids: Vec<i64>,
}

/// POST /api/talks/:id/tags
pub async fn add_talk_tags(
    State(state): State<AppState>,
    Path(talk_id): Path<String>,
    Json(body): Json<TagRequest>,
) -> ApiResult<Json<Vec<TagGroup>>> {
    taxonomies::add_tags(&state.store, &talk_id, &body.taxonomy_value_ids).await?;
    let groups = taxonomies::talk_tags(state.store.pool(), &talk_id)
        .await?
        .unwrap_or_default();
    Ok(Json(groups))
}

/// PUT /api/talks/:id/tags
pub async fn replace_talk_tags(
    State(state): State<AppState>,
    Path(talk_id): Path<String>,
    Json(body): Json<TagRequest>,
) -> ApiResult<Json<Vec<TagGroup>>> {
    taxonomies::replace_tags(&state.store, &talk_id, &body.taxonomy_value_ids).await?;
    let groups = taxonomies::talk_tags(state.store.pool(), &talk_id)
        .await?
        .unwrap_or_default();
    Ok(Json(groups))
}

/// DELETE /api/talks/:id/tags/:value_id
pub async fn remove_talk_tag(
    State(state): State<AppState>,
    Path((talk_id, value_id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    taxonomies::remove_tag(&state.store, &talk_id, value_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_lists_trim_and_drop_empty_entries() {
        assert_eq!(
            split_comma_list(Some("meetup, conference_talk ,,")),
            vec!["meetup", "conference_talk"]
        );
        assert!(split_comma_list(None).is_empty());
        assert!(split_comma_list(Some("  ")).is_empty());
    }
}
