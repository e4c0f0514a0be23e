//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use talkdex::db::talks::{Talk, TalkStore};
use talkdex::db::{init_database, taxonomies};
use talkdex::search::text::select_strategy;
use talkdex::search::SearchEngine;
use talkdex::sync::{SyncConfig, SyncReconciler};
use talkdex::tagging::{KeywordClassifier, TagClassifier};
use talkdex::{build_router, AppState};
use tempfile::TempDir;

/// Fresh catalog on a temporary database file. The TempDir must stay
/// alive for the duration of the test.
pub async fn setup_catalog() -> (TempDir, TalkStore, SearchEngine) {
    let dir = TempDir::new().expect("create temp dir");
    let pool = init_database(&dir.path().join("talkdex.db"))
        .await
        .expect("init database");
    let strategy = select_strategy(&pool).await;
    let store = TalkStore::new(pool.clone(), strategy.clone());
    let engine = SearchEngine::new(pool, strategy);
    (dir, store, engine)
}

pub async fn seed_talk(store: &TalkStore, title: &str, description: &str, talk_type: &str) -> Talk {
    let mut talk = Talk::new(
        title.to_string(),
        description.to_string(),
        talk_type.to_string(),
    );
    store.create(&mut talk).await.expect("create talk");
    talk
}

/// Create a taxonomy with the given values, returning the value IDs in order
pub async fn seed_taxonomy(store: &TalkStore, name: &str, values: &[&str]) -> Vec<i64> {
    let taxonomy = taxonomies::create_taxonomy(store.pool(), name, "", false)
        .await
        .expect("create taxonomy");
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        let created = taxonomies::create_value(store.pool(), taxonomy.id, value, "", "")
            .await
            .expect("create value")
            .expect("taxonomy exists");
        ids.push(created.id);
    }
    ids
}

/// Full application with no configured sync sources
pub async fn setup_app() -> (TempDir, axum::Router, TalkStore) {
    let (dir, store, engine) = setup_catalog().await;
    let classifier: Arc<dyn TagClassifier> = Arc::new(KeywordClassifier::with_default_rules());
    let reconciler = Arc::new(SyncReconciler::new(
        store.clone(),
        classifier.clone(),
        Vec::new(),
        SyncConfig::default(),
    ));
    let app = build_router(AppState {
        store: store.clone(),
        search: engine,
        classifier,
        reconciler,
    });
    (dir, app, store)
}
