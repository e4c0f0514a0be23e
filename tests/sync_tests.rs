//! Integration tests for source reconciliation: create/update/skip
//! decisions, sync bookkeeping, and per-source failure isolation.

mod helpers;

use async_trait::async_trait;
use helpers::setup_catalog;
use serde_json::json;
use std::sync::Arc;
use talkdex::db::sync_status::get_sync_status;
use talkdex::db::talks::TalkStore;
use talkdex::sync::sources::{RawTalk, SourceClient};
use talkdex::sync::{SyncConfig, SyncReconciler};
use talkdex::tagging::{KeywordClassifier, TagClassifier};
use talkdex::{Error, Result};

struct FakeSource {
    source_type: &'static str,
    records: Vec<RawTalk>,
    fail: bool,
}

#[async_trait]
impl SourceClient for FakeSource {
    fn source_type(&self) -> &str {
        self.source_type
    }

    async fn fetch_all(&self) -> Result<Vec<RawTalk>> {
        if self.fail {
            Err(Error::Source("upstream unavailable".to_string()))
        } else {
            Ok(self.records.clone())
        }
    }
}

fn record(source_type: &str, source_id: &str, title: &str, description: &str) -> RawTalk {
    RawTalk {
        title: title.to_string(),
        description: description.to_string(),
        talk_type: "meetup".to_string(),
        speaker_names: vec!["Ada".to_string()],
        source_type: source_type.to_string(),
        source_id: source_id.to_string(),
        source_url: None,
        type_specific_data: json!({"going_count": 5}),
        source_updated_at: None,
    }
}

fn reconciler(store: &TalkStore, sources: Vec<Box<dyn SourceClient>>) -> SyncReconciler {
    let classifier: Arc<dyn TagClassifier> = Arc::new(KeywordClassifier::with_default_rules());
    SyncReconciler::new(store.clone(), classifier, sources, SyncConfig::default())
}

#[tokio::test]
async fn first_sync_creates_records_with_auto_tags() {
    let (_dir, store, _engine) = setup_catalog().await;
    let source = FakeSource {
        source_type: "fake",
        records: vec![record("fake", "r1", "Docker for Python devs", "containers and pytest")],
        fail: false,
    };

    let reports = reconciler(&store, vec![Box::new(source)]).run().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].created, 1);
    assert_eq!(reports[0].failed, 0);

    let mut conn = store.pool().acquire().await.unwrap();
    let talk = TalkStore::get_by_source(&mut conn, "fake", "r1")
        .await
        .unwrap()
        .expect("talk created");
    assert!(talk.auto_tags.contains(&"DevOps".to_string()));
    assert!(talk.auto_tags.contains(&"Testing".to_string()));
    assert!(talk.last_synced.is_some());

    let status = get_sync_status(store.pool(), "fake").await.unwrap().unwrap();
    assert_eq!(status.sync_count, 1);
    assert_eq!(status.error_count, 0);
    assert!(status.last_successful_sync.is_some());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn unchanged_second_sync_skips_without_touching_last_synced() {
    let (_dir, store, _engine) = setup_catalog().await;
    let records = vec![record("fake", "r1", "A talk", "about things")];

    let first = FakeSource { source_type: "fake", records: records.clone(), fail: false };
    reconciler(&store, vec![Box::new(first)]).run().await.unwrap();

    let mut conn = store.pool().acquire().await.unwrap();
    let before = TalkStore::get_by_source(&mut conn, "fake", "r1")
        .await
        .unwrap()
        .unwrap();
    drop(conn);

    let second = FakeSource { source_type: "fake", records, fail: false };
    let reports = reconciler(&store, vec![Box::new(second)]).run().await.unwrap();
    assert_eq!(reports[0].created, 0);
    assert_eq!(reports[0].skipped, 1);

    let mut conn = store.pool().acquire().await.unwrap();
    let after = TalkStore::get_by_source(&mut conn, "fake", "r1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.last_synced, after.last_synced);

    let status = get_sync_status(store.pool(), "fake").await.unwrap().unwrap();
    assert_eq!(status.sync_count, 2);
}

#[tokio::test]
async fn changed_title_updates_record_and_retags() {
    let (_dir, store, _engine) = setup_catalog().await;
    let first = FakeSource {
        source_type: "fake",
        records: vec![record("fake", "r1", "Plain talk", "nothing notable")],
        fail: false,
    };
    reconciler(&store, vec![Box::new(first)]).run().await.unwrap();

    let second = FakeSource {
        source_type: "fake",
        records: vec![record("fake", "r1", "Machine learning talk", "nothing notable")],
        fail: false,
    };
    let reports = reconciler(&store, vec![Box::new(second)]).run().await.unwrap();
    assert_eq!(reports[0].updated, 1);

    let mut conn = store.pool().acquire().await.unwrap();
    let talk = TalkStore::get_by_source(&mut conn, "fake", "r1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(talk.title, "Machine learning talk");
    assert!(talk.auto_tags.contains(&"AI/ML".to_string()));
    assert!(talk.search_vector.contains("machine learning"));
}

#[tokio::test]
async fn going_count_change_forces_update_for_meetup() {
    let (_dir, store, _engine) = setup_catalog().await;
    let mut base = record("meetup", "ev-1", "Rust meetup", "monthly");
    let first = FakeSource { source_type: "meetup", records: vec![base.clone()], fail: false };
    reconciler(&store, vec![Box::new(first)]).run().await.unwrap();

    base.type_specific_data = json!({"going_count": 42});
    let second = FakeSource { source_type: "meetup", records: vec![base], fail: false };
    let reports = reconciler(&store, vec![Box::new(second)]).run().await.unwrap();
    assert_eq!(reports[0].updated, 1);

    let mut conn = store.pool().acquire().await.unwrap();
    let talk = TalkStore::get_by_source(&mut conn, "meetup", "ev-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(talk.type_specific_data["going_count"], 42);
}

#[tokio::test]
async fn failing_source_is_isolated_and_recorded() {
    let (_dir, store, _engine) = setup_catalog().await;
    let broken = FakeSource { source_type: "broken", records: vec![], fail: true };
    let healthy = FakeSource {
        source_type: "healthy",
        records: vec![record("healthy", "r1", "A talk", "fine")],
        fail: false,
    };

    let reports = reconciler(&store, vec![Box::new(broken), Box::new(healthy)])
        .run()
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].error.is_some());
    assert_eq!(reports[1].created, 1);

    let broken_status = get_sync_status(store.pool(), "broken").await.unwrap().unwrap();
    assert_eq!(broken_status.error_count, 1);
    assert!(broken_status.last_error.is_some());
    assert!(broken_status.last_successful_sync.is_none());

    let healthy_status = get_sync_status(store.pool(), "healthy").await.unwrap().unwrap();
    assert_eq!(healthy_status.error_count, 0);
    assert!(healthy_status.last_successful_sync.is_some());
}

#[tokio::test]
async fn recovery_clears_last_error() {
    let (_dir, store, _engine) = setup_catalog().await;
    let broken = FakeSource { source_type: "fake", records: vec![], fail: true };
    reconciler(&store, vec![Box::new(broken)]).run().await.unwrap();

    let ok = FakeSource { source_type: "fake", records: vec![], fail: false };
    reconciler(&store, vec![Box::new(ok)]).run().await.unwrap();

    let status = get_sync_status(store.pool(), "fake").await.unwrap().unwrap();
    assert_eq!(status.sync_count, 2);
    assert_eq!(status.error_count, 1);
    assert!(status.last_error.is_none());
    assert!(status.last_successful_sync.is_some());
}
