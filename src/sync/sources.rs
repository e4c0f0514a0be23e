//! External talk sources.
//!
//! Each source fetches its upstream catalog and normalizes records into
//! [`RawTalk`]s; everything past that point is source-agnostic.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const USER_AGENT: &str = concat!("talkdex/", env!("CARGO_PKG_VERSION"));

/// A normalized talk record as fetched from an upstream source
#[derive(Debug, Clone)]
pub struct RawTalk {
    pub title: String,
    pub description: String,
    pub talk_type: String,
    pub speaker_names: Vec<String>,
    pub source_type: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub type_specific_data: serde_json::Value,
    pub source_updated_at: Option<DateTime<Utc>>,
}

/// A client for one upstream talk source
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source_type(&self) -> &str;

    /// Fetch and normalize every record the source currently publishes
    async fn fetch_all(&self) -> Result<Vec<RawTalk>>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Source(format!("http client: {}", e)))
}

// ---- Meetup ----

#[derive(Debug, Deserialize)]
struct MeetupEvent {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    group: Option<MeetupGroup>,
    #[serde(default)]
    venue: Option<MeetupVenue>,
    #[serde(default)]
    going_count: i64,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MeetupGroup {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MeetupVenue {
    name: String,
}

pub struct MeetupClient {
    url: String,
    client: reqwest::Client,
}

impl MeetupClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl SourceClient for MeetupClient {
    fn source_type(&self) -> &str {
        "meetup"
    }

    async fn fetch_all(&self) -> Result<Vec<RawTalk>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Source(format!(
                "meetup returned HTTP {}",
                response.status()
            )));
        }
        let events: Vec<MeetupEvent> = response.json().await?;

        Ok(events
            .into_iter()
            .map(|event| {
                let group_name = event.group.map(|g| g.name);
                let venue_name = event.venue.map(|v| v.name);
                RawTalk {
                    title: event.name,
                    description: event.description,
                    talk_type: "meetup".to_string(),
                    speaker_names: Vec::new(),
                    source_type: "meetup".to_string(),
                    source_id: event.id,
                    source_url: event.link,
                    type_specific_data: json!({
                        "group_name": group_name,
                        "venue_name": venue_name,
                        "going_count": event.going_count,
                    }),
                    source_updated_at: event.updated,
                }
            })
            .collect())
    }
}

// ---- Sessionize ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionizeSession {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    speakers: Vec<SessionizeSpeaker>,
    #[serde(default)]
    room: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SessionizeSpeaker {
    name: String,
}

pub struct SessionizeClient {
    url: String,
    client: reqwest::Client,
}

impl SessionizeClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url,
            client: http_client(timeout)?,
        })
    }
}

/// Map a Sessionize session format to a catalog talk type
fn session_talk_type(format: Option<&str>) -> &'static str {
    match format.map(|f| f.to_lowercase()) {
        Some(f) if f.contains("lightning") => "lightning_talk",
        Some(f) if f.contains("workshop") => "workshop",
        Some(f) if f.contains("keynote") => "keynote",
        _ => "conference_talk",
    }
}

#[async_trait]
impl SourceClient for SessionizeClient {
    fn source_type(&self) -> &str {
        "sessionize"
    }

    async fn fetch_all(&self) -> Result<Vec<RawTalk>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Source(format!(
                "sessionize returned HTTP {}",
                response.status()
            )));
        }
        let sessions: Vec<SessionizeSession> = response.json().await?;

        Ok(sessions
            .into_iter()
            .map(|session| RawTalk {
                talk_type: session_talk_type(session.format.as_deref()).to_string(),
                title: session.title,
                description: session.description,
                speaker_names: session.speakers.into_iter().map(|s| s.name).collect(),
                source_type: "sessionize".to_string(),
                source_id: session.id,
                source_url: None,
                type_specific_data: json!({
                    "event_name": session.event_name,
                    "room": session.room,
                    "format": session.format,
                }),
                source_updated_at: session.updated_at,
            })
            .collect())
    }
}

/// Build the source clients named in the configuration
pub fn sources_from_settings(
    settings: &crate::config::Settings,
) -> Result<Vec<Box<dyn SourceClient>>> {
    let timeout = Duration::from_secs(settings.fetch_timeout_secs);
    let mut sources: Vec<Box<dyn SourceClient>> = Vec::new();
    if let Some(url) = &settings.sources.meetup_url {
        sources.push(Box::new(MeetupClient::new(url.clone(), timeout)?));
    }
    if let Some(url) = &settings.sources.sessionize_url {
        sources.push(Box::new(SessionizeClient::new(url.clone(), timeout)?));
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_formats_map_to_talk_types() {
        assert_eq!(session_talk_type(Some("Lightning Talk")), "lightning_talk");
        assert_eq!(session_talk_type(Some("Hands-on Workshop")), "workshop");
        assert_eq!(session_talk_type(Some("Opening Keynote")), "keynote");
        assert_eq!(session_talk_type(Some("Session (45 min)")), "conference_talk");
        assert_eq!(session_talk_type(None), "conference_talk");
    }

    #[test]
    fn meetup_events_deserialize_with_sparse_fields() {
        let events: Vec<MeetupEvent> = serde_json::from_str(
            r#"[{"id": "ev-1", "name": "Rust meetup"}]"#,
        )
        .unwrap();
        assert_eq!(events[0].id, "ev-1");
        assert_eq!(events[0].going_count, 0);
        assert!(events[0].group.is_none());
    }
}
