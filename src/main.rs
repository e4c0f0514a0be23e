use anyhow::Context;
use std::sync::Arc;
use talkdex::db::talks::TalkStore;
use talkdex::db::{init_database, taxonomies};
use talkdex::search::text::select_strategy;
use talkdex::search::SearchEngine;
use talkdex::sync::sources::sources_from_settings;
use talkdex::sync::{SyncConfig, SyncReconciler};
use talkdex::tagging::{KeywordClassifier, TagClassifier};
use talkdex::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = talkdex::config::load().context("loading configuration")?;
    info!(database = %settings.database_path.display(), "starting talkdex");

    let pool = init_database(&settings.database_path)
        .await
        .context("initializing database")?;
    taxonomies::seed_default_taxonomies(&pool)
        .await
        .context("seeding default taxonomies")?;

    let text_search = select_strategy(&pool).await;
    let store = TalkStore::new(pool.clone(), text_search.clone());
    let search = SearchEngine::new(pool.clone(), text_search);
    let classifier: Arc<dyn TagClassifier> = Arc::new(KeywordClassifier::with_default_rules());

    let sources = sources_from_settings(&settings).context("building source clients")?;
    let reconciler = Arc::new(SyncReconciler::new(
        store.clone(),
        classifier.clone(),
        sources,
        SyncConfig::from_settings(&settings),
    ));

    let app = build_router(AppState {
        store,
        search,
        classifier,
        reconciler,
    });

    let listener = tokio::net::TcpListener::bind(settings.bind_addr.as_str())
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
