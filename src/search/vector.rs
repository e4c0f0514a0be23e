//! Search vector derivation
//!
//! The search vector is a derived column: a lowercase blob of every
//! searchable field, rebuilt on each write and never hand-edited.

use crate::db::talks::Talk;
use serde_json::Value;

/// Type-specific fields that feed the search vector
const TYPE_SPECIFIC_SEARCH_KEYS: [&str; 5] = ["event_name", "group_name", "room", "topics", "hosts"];

/// Build the search vector for a talk, given its current manual tag values.
///
/// Pure and idempotent: identical input always yields byte-identical output.
pub fn build_search_vector(talk: &Talk, manual_tags: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(talk.title.clone());
    parts.push(talk.description.clone());
    parts.push(talk.talk_type.clone());
    parts.extend(talk.speaker_names.iter().cloned());
    parts.extend(talk.auto_tags.iter().cloned());
    parts.extend(manual_tags.iter().cloned());

    if let Value::Object(map) = &talk.type_specific_data {
        for key in TYPE_SPECIFIC_SEARCH_KEYS {
            match map.get(key) {
                Some(Value::Array(items)) => {
                    parts.extend(items.iter().map(flatten_value));
                }
                Some(value) => parts.push(flatten_value(value)),
                None => {}
            }
        }
    }

    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Degrade a JSON value to searchable text; never fails
fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_talk() -> Talk {
        let mut talk = Talk::new(
            "Fast APIs with Axum".to_string(),
            "Building web services".to_string(),
            "conference_talk".to_string(),
        );
        talk.speaker_names = vec!["Ada Lovelace".to_string()];
        talk.auto_tags = vec!["Web Development".to_string()];
        talk.type_specific_data = json!({
            "event_name": "RustConf",
            "room": "Main Hall",
            "topics": ["async", "http"],
            "venue": {"city": "Portland"}
        });
        talk
    }

    #[test]
    fn concatenates_all_fields_lowercased() {
        let talk = sample_talk();
        let v = build_search_vector(&talk, &["beginner".to_string()]);
        assert_eq!(
            v,
            "fast apis with axum building web services conference_talk \
             ada lovelace web development beginner rustconf main hall async http"
        );
    }

    #[test]
    fn is_idempotent() {
        let talk = sample_talk();
        let tags = vec!["beginner".to_string()];
        assert_eq!(build_search_vector(&talk, &tags), build_search_vector(&talk, &tags));
    }

    #[test]
    fn skips_empty_fields() {
        let mut talk = Talk::new("Title".to_string(), String::new(), String::new());
        talk.speaker_names = vec!["".to_string(), "  ".to_string()];
        assert_eq!(build_search_vector(&talk, &[]), "title");
    }

    #[test]
    fn flattens_list_values_element_by_element() {
        let mut talk = Talk::new("T".to_string(), String::new(), String::new());
        talk.type_specific_data = json!({"topics": ["Rust", "WASM"]});
        assert_eq!(build_search_vector(&talk, &[]), "t rust wasm");
    }

    #[test]
    fn non_string_values_degrade_to_raw_text() {
        let mut talk = Talk::new("T".to_string(), String::new(), String::new());
        talk.type_specific_data = json!({"room": 42, "group_name": {"nested": true}});
        let v = build_search_vector(&talk, &[]);
        assert!(v.contains("42"));
        assert!(v.contains("nested"));
    }

    #[test]
    fn ignores_keys_outside_the_allow_list() {
        let mut talk = Talk::new("T".to_string(), String::new(), String::new());
        talk.type_specific_data = json!({"going_count": 57, "city": "Berlin"});
        assert_eq!(build_search_vector(&talk, &[]), "t");
    }
}
