//! Configuration loading
//!
//! Settings resolve with the priority order: command-line argument,
//! environment variable, TOML config file, compiled default.

use crate::{Error, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "talkdex", about = "Talk catalog and search service")]
struct Cli {
    /// Path to TOML config file
    #[arg(long, env = "TALKDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database file
    #[arg(long, env = "TALKDEX_DATABASE")]
    database: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long, env = "TALKDEX_BIND")]
    bind: Option<String>,
}

/// External source endpoints; a source is only synced when its URL is set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceEndpoints {
    pub meetup_url: Option<String>,
    pub sessionize_url: Option<String>,
}

/// Service settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite database file path
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// I/O timeout applied to external source fetches
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Hours after which an unchanged synced record is refreshed anyway
    #[serde(default = "default_staleness_window_hours")]
    pub staleness_window_hours: i64,

    #[serde(default)]
    pub sources: SourceEndpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_addr: default_bind_addr(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            staleness_window_hours: default_staleness_window_hours(),
            sources: SourceEndpoints::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("talkdex").join("talkdex.db"))
        .unwrap_or_else(|| PathBuf::from("talkdex.db"))
}

fn default_bind_addr() -> String {
    "127.0.0.1:5730".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_staleness_window_hours() -> i64 {
    24
}

/// Load settings from CLI arguments, environment, and an optional TOML file
pub fn load() -> Result<Settings> {
    let cli = Cli::parse();
    load_with_overrides(cli.config, cli.database, cli.bind)
}

fn load_with_overrides(
    config_file: Option<PathBuf>,
    database: Option<PathBuf>,
    bind: Option<String>,
) -> Result<Settings> {
    let mut settings = match config_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("cannot read config file {}: {}", path.display(), e))
            })?;
            toml::from_str::<Settings>(&content)
                .map_err(|e| Error::Config(format!("invalid config file: {}", e)))?
        }
        None => Settings::default(),
    };

    // CLI/env overrides take precedence over the file
    if let Some(db) = database {
        settings.database_path = db;
    }
    if let Some(bind) = bind {
        settings.bind_addr = bind;
    }

    if settings.staleness_window_hours <= 0 {
        return Err(Error::Config(
            "staleness_window_hours must be positive".to_string(),
        ));
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.staleness_window_hours, 24);
        assert_eq!(s.fetch_timeout_secs, 30);
        assert!(s.sources.meetup_url.is_none());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("talkdex-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
bind_addr = "0.0.0.0:9000"
staleness_window_hours = 6

[sources]
meetup_url = "http://localhost:1234/events"
"#,
        )
        .unwrap();

        let s = load_with_overrides(Some(path.clone()), None, None).unwrap();
        assert_eq!(s.bind_addr, "0.0.0.0:9000");
        assert_eq!(s.staleness_window_hours, 6);
        assert_eq!(
            s.sources.meetup_url.as_deref(),
            Some("http://localhost:1234/events")
        );

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn cli_override_wins_over_file() {
        let s = load_with_overrides(None, Some(PathBuf::from("/tmp/x.db")), None).unwrap();
        assert_eq!(s.database_path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn rejects_non_positive_staleness() {
        let path =
            std::env::temp_dir().join(format!("talkdex-config-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "staleness_window_hours = 0\n").unwrap();
        assert!(load_with_overrides(Some(path.clone()), None, None).is_err());
        let _ = std::fs::remove_file(path);
    }
}
