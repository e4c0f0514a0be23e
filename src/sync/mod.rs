//! Source reconciliation: pull records from every configured source and
//! fold them into the catalog.
//!
//! Failures are isolated per source and per record; one broken source
//! never blocks the others, and every attempt lands in sync_status.

pub mod sources;

use crate::db::sync_status::record_sync_result;
use crate::db::talks::{Talk, TalkStore};
use crate::tagging::TagClassifier;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sources::{RawTalk, SourceClient};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records older than this get refreshed even without a content change
    pub staleness_window: Duration,
    /// (source_type, type_specific_data key) pairs whose change alone
    /// forces an update
    pub volatile_fields: Vec<(String, String)>,
}

impl SyncConfig {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            staleness_window: Duration::hours(settings.staleness_window_hours),
            volatile_fields: vec![("meetup".to_string(), "going_count".to_string())],
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::hours(24),
            volatile_fields: vec![("meetup".to_string(), "going_count".to_string())],
        }
    }
}

/// Outcome of syncing one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_type: String,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source_type: &str) -> Self {
        Self {
            source_type: source_type.to_string(),
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            error: None,
        }
    }
}

pub struct SyncReconciler {
    store: TalkStore,
    classifier: Arc<dyn TagClassifier>,
    sources: Vec<Box<dyn SourceClient>>,
    config: SyncConfig,
}

impl SyncReconciler {
    pub fn new(
        store: TalkStore,
        classifier: Arc<dyn TagClassifier>,
        sources: Vec<Box<dyn SourceClient>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            sources,
            config,
        }
    }

    /// Sync every configured source, recording each attempt in sync_status
    pub async fn run(&self) -> Result<Vec<SourceReport>> {
        let mut reports = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let report = self.sync_source(source.as_ref()).await;
            record_sync_result(self.store.pool(), &report.source_type, report.error.as_deref())
                .await?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn sync_source(&self, source: &dyn SourceClient) -> SourceReport {
        let source_type = source.source_type().to_string();
        let mut report = SourceReport::new(&source_type);

        let records = match source.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(source = %source_type, error = %e, "source fetch failed");
                report.error = Some(e.to_string());
                return report;
            }
        };

        for record in records {
            match self.reconcile_record(&record).await {
                Ok(Outcome::Created) => report.created += 1,
                Ok(Outcome::Updated) => report.updated += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        source = %source_type,
                        source_id = %record.source_id,
                        error = %e,
                        "record reconcile failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            source = %source_type,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "source sync complete"
        );
        report
    }

    /// Insert or update one record inside its own transaction
    async fn reconcile_record(&self, incoming: &RawTalk) -> Result<Outcome> {
        let auto_tags = self.classifier.classify(&incoming.title, &incoming.description);
        let now = Utc::now();

        let mut tx = self.store.pool().begin().await?;
        let existing =
            TalkStore::get_by_source(&mut tx, &incoming.source_type, &incoming.source_id).await?;

        let outcome = match existing {
            None => {
                let mut talk = Talk::new(
                    incoming.title.clone(),
                    incoming.description.clone(),
                    incoming.talk_type.clone(),
                );
                talk.speaker_names = incoming.speaker_names.clone();
                talk.source_type = Some(incoming.source_type.clone());
                talk.source_id = Some(incoming.source_id.clone());
                talk.source_url = incoming.source_url.clone();
                talk.auto_tags = auto_tags;
                talk.type_specific_data = incoming.type_specific_data.clone();
                talk.source_updated_at = incoming.source_updated_at;
                talk.last_synced = Some(now);
                self.store.insert_in_tx(&mut tx, &mut talk).await?;
                Outcome::Created
            }
            Some(mut talk) => {
                match should_update(&talk, incoming, &auto_tags, now, &self.config) {
                    None => Outcome::Skipped,
                    Some(reason) => {
                        info!(talk_id = %talk.id, reason, "refreshing synced talk");
                        talk.title = incoming.title.clone();
                        talk.description = incoming.description.clone();
                        talk.talk_type = incoming.talk_type.clone();
                        talk.speaker_names = incoming.speaker_names.clone();
                        talk.source_url = incoming.source_url.clone();
                        talk.auto_tags = auto_tags;
                        talk.type_specific_data = incoming.type_specific_data.clone();
                        talk.source_updated_at = incoming.source_updated_at;
                        talk.last_synced = Some(now);
                        self.store.update_in_tx(&mut tx, &mut talk).await?;
                        Outcome::Updated
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

/// Decide whether an existing talk needs a refresh from the incoming
/// record; returns the reason, or None when the record can be skipped.
pub(crate) fn should_update(
    existing: &Talk,
    incoming: &RawTalk,
    incoming_tags: &[String],
    now: DateTime<Utc>,
    config: &SyncConfig,
) -> Option<&'static str> {
    if existing.title != incoming.title
        || existing.description != incoming.description
        || existing.talk_type != incoming.talk_type
        || existing.speaker_names != incoming.speaker_names
        || existing.source_url != incoming.source_url
    {
        return Some("content changed");
    }

    let old_tags: HashSet<&str> = existing.auto_tags.iter().map(String::as_str).collect();
    let new_tags: HashSet<&str> = incoming_tags.iter().map(String::as_str).collect();
    if old_tags != new_tags {
        return Some("auto tags changed");
    }

    for (source_type, key) in &config.volatile_fields {
        if existing.source_type.as_deref() == Some(source_type.as_str())
            && existing.type_specific_data.get(key) != incoming.type_specific_data.get(key)
        {
            return Some("volatile field changed");
        }
    }

    match existing.last_synced {
        None => Some("never synced"),
        Some(last) if now - last > config.staleness_window => Some("stale"),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn existing_talk() -> Talk {
        let mut talk = Talk::new(
            "Async Rust".to_string(),
            "Futures and executors".to_string(),
            "conference_talk".to_string(),
        );
        talk.source_type = Some("meetup".to_string());
        talk.source_id = Some("ev-1".to_string());
        talk.auto_tags = vec!["Web Development".to_string()];
        talk.type_specific_data = json!({"going_count": 10});
        talk.last_synced = Some(Utc::now());
        talk
    }

    fn matching_incoming(talk: &Talk) -> RawTalk {
        RawTalk {
            title: talk.title.clone(),
            description: talk.description.clone(),
            talk_type: talk.talk_type.clone(),
            speaker_names: talk.speaker_names.clone(),
            source_type: "meetup".to_string(),
            source_id: "ev-1".to_string(),
            source_url: talk.source_url.clone(),
            type_specific_data: talk.type_specific_data.clone(),
            source_updated_at: None,
        }
    }

    #[test]
    fn unchanged_fresh_record_is_skipped() {
        let talk = existing_talk();
        let incoming = matching_incoming(&talk);
        let tags = talk.auto_tags.clone();
        let decision = should_update(&talk, &incoming, &tags, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, None);
    }

    #[test]
    fn title_change_forces_update() {
        let talk = existing_talk();
        let mut incoming = matching_incoming(&talk);
        incoming.title = "Async Rust, revisited".to_string();
        let tags = talk.auto_tags.clone();
        let decision = should_update(&talk, &incoming, &tags, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, Some("content changed"));
    }

    #[test]
    fn auto_tag_diff_ignores_order() {
        let mut talk = existing_talk();
        talk.auto_tags = vec!["Testing".to_string(), "DevOps".to_string()];
        let incoming = matching_incoming(&talk);
        let reordered = vec!["DevOps".to_string(), "Testing".to_string()];
        let decision =
            should_update(&talk, &incoming, &reordered, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, None);
    }

    #[test]
    fn new_auto_tag_forces_update() {
        let talk = existing_talk();
        let incoming = matching_incoming(&talk);
        let tags = vec!["Web Development".to_string(), "Security".to_string()];
        let decision = should_update(&talk, &incoming, &tags, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, Some("auto tags changed"));
    }

    #[test]
    fn stale_record_is_refreshed() {
        let mut talk = existing_talk();
        talk.last_synced = Some(Utc::now() - Duration::hours(48));
        let incoming = matching_incoming(&talk);
        let tags = talk.auto_tags.clone();
        let decision = should_update(&talk, &incoming, &tags, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, Some("stale"));

        talk.last_synced = None;
        let decision = should_update(&talk, &incoming, &tags, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, Some("never synced"));
    }

    #[test]
    fn going_count_is_volatile_for_meetup() {
        let talk = existing_talk();
        let mut incoming = matching_incoming(&talk);
        incoming.type_specific_data = json!({"going_count": 25});
        let tags = talk.auto_tags.clone();
        let decision = should_update(&talk, &incoming, &tags, Utc::now(), &SyncConfig::default());
        assert_eq!(decision, Some("volatile field changed"));
    }
}
