//! Taxonomy management endpoints.

use crate::api::ApiResult;
use crate::db::taxonomies::{
    self, PopularTag, Taxonomy, TaxonomyUsage, TaxonomyValue,
};
use crate::{AppState, Error};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

/// GET /api/taxonomies
pub async fn list_taxonomies(State(state): State<AppState>) -> ApiResult<Json<Vec<Taxonomy>>> {
    Ok(Json(taxonomies::list_taxonomies(state.store.pool()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaxonomyRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/taxonomies
pub async fn create_taxonomy(
    State(state): State<AppState>,
    Json(body): Json<CreateTaxonomyRequest>,
) -> ApiResult<(StatusCode, Json<Taxonomy>)> {
    let taxonomy =
        taxonomies::create_taxonomy(state.store.pool(), &body.name, &body.description, false)
            .await?;
    Ok((StatusCode::CREATED, Json(taxonomy)))
}

/// GET /api/taxonomies/:id
pub async fn get_taxonomy(
    State(state): State<AppState>,
    Path(taxonomy_id): Path<i64>,
) -> ApiResult<Json<Taxonomy>> {
    let taxonomy = taxonomies::get_taxonomy(state.store.pool(), taxonomy_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("taxonomy {}", taxonomy_id)))?;
    Ok(Json(taxonomy))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UpdateTaxonomyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// PUT /api/taxonomies/:id
pub async fn update_taxonomy(
    State(state): State<AppState>,
    Path(taxonomy_id): Path<i64>,
    Json(body): Json<UpdateTaxonomyRequest>,
) -> ApiResult<Json<Taxonomy>> {
    let taxonomy = taxonomies::update_taxonomy(
        state.store.pool(),
        taxonomy_id,
        body.name.as_deref(),
        body.description.as_deref(),
    )
    .await?
    .ok_or_else(|| Error::NotFound(format!("taxonomy {}", taxonomy_id)))?;
    Ok(Json(taxonomy))
}

/// DELETE /api/taxonomies/:id
pub async fn delete_taxonomy(
    State(state): State<AppState>,
    Path(taxonomy_id): Path<i64>,
) -> ApiResult<StatusCode> {
    if taxonomies::delete_taxonomy(state.store.pool(), taxonomy_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound(format!("taxonomy {}", taxonomy_id)).into())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateValueRequest {
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

/// POST /api/taxonomies/:id/values
pub async fn create_value(
    State(state): State<AppState>,
    Path(taxonomy_id): Path<i64>,
    Json(body): Json<CreateValueRequest>,
) -> ApiResult<(StatusCode, Json<TaxonomyValue>)> {
    let value = taxonomies::create_value(
        state.store.pool(),
        taxonomy_id,
        &body.value,
        &body.description,
        &body.color,
    )
    .await?
    .ok_or_else(|| Error::NotFound(format!("taxonomy {}", taxonomy_id)))?;
    Ok((StatusCode::CREATED, Json(value)))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UpdateValueRequest {
    pub value: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// PUT /api/taxonomies/values/:value_id
pub async fn update_value(
    State(state): State<AppState>,
    Path(value_id): Path<i64>,
    Json(body): Json<UpdateValueRequest>,
) -> ApiResult<Json<TaxonomyValue>> {
    let value = taxonomies::update_value(
        state.store.pool(),
        value_id,
        body.value.as_deref(),
        body.description.as_deref(),
        body.color.as_deref(),
    )
    .await?
    .ok_or_else(|| Error::NotFound(format!("taxonomy value {}", value_id)))?;
    Ok(Json(value))
}

/// DELETE /api/taxonomies/values/:value_id
pub async fn delete_value(
    State(state): State<AppState>,
    Path(value_id): Path<i64>,
) -> ApiResult<StatusCode> {
    if taxonomies::delete_value(state.store.pool(), value_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound(format!("taxonomy value {}", value_id)).into())
    }
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub taxonomy_id: Option<i64>,
}

/// GET /api/taxonomies/usage
pub async fn usage(
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> ApiResult<Json<Vec<TaxonomyUsage>>> {
    Ok(Json(
        taxonomies::usage_counts(state.store.pool(), params.taxonomy_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    pub limit: Option<i64>,
}

/// GET /api/taxonomies/popular
pub async fn popular(
    State(state): State<AppState>,
    Query(params): Query<PopularQuery>,
) -> ApiResult<Json<Vec<PopularTag>>> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    Ok(Json(taxonomies::most_popular(state.store.pool(), limit).await?))
}
