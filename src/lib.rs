//! Talkdex: a talk catalog service.
//!
//! Aggregates conference and meetup talks from external sources into one
//! searchable SQLite catalog, auto-classifies them, and exposes a JSON API
//! for search, manual taxonomy tagging, and sync control.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod search;
pub mod sync;
pub mod tagging;

pub use error::{Error, Result};

use axum::routing::{get, post, put};
use axum::Router;
use db::talks::TalkStore;
use search::SearchEngine;
use std::sync::Arc;
use sync::SyncReconciler;
use tagging::TagClassifier;
use tower_http::trace::TraceLayer;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: TalkStore,
    pub search: SearchEngine,
    pub classifier: Arc<dyn TagClassifier>,
    pub reconciler: Arc<SyncReconciler>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route(
            "/api/talks",
            get(api::talks::list_talks).post(api::talks::create_talk),
        )
        .route("/api/talks/search", post(api::talks::advanced_search))
        .route("/api/talks/types", get(api::talks::list_types))
        .route("/api/talks/:id", get(api::talks::get_talk))
        .route(
            "/api/talks/:id/tags",
            get(api::talks::get_talk_tags)
                .post(api::talks::add_talk_tags)
                .put(api::talks::replace_talk_tags),
        )
        .route(
            "/api/talks/:id/tags/:value_id",
            axum::routing::delete(api::talks::remove_talk_tag),
        )
        .route(
            "/api/taxonomies",
            get(api::taxonomies::list_taxonomies).post(api::taxonomies::create_taxonomy),
        )
        .route("/api/taxonomies/usage", get(api::taxonomies::usage))
        .route("/api/taxonomies/popular", get(api::taxonomies::popular))
        .route(
            "/api/taxonomies/values/:value_id",
            put(api::taxonomies::update_value).delete(api::taxonomies::delete_value),
        )
        .route(
            "/api/taxonomies/:id",
            get(api::taxonomies::get_taxonomy)
                .put(api::taxonomies::update_taxonomy)
                .delete(api::taxonomies::delete_taxonomy),
        )
        .route(
            "/api/taxonomies/:id/values",
            post(api::taxonomies::create_value),
        )
        .route("/api/sync", post(api::ingest::run_sync))
        .route("/api/sync/status", get(api::ingest::sync_statuses))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
