use crate::apis::retry::RetryPolicy;
use crate::constants::SPREADSHEET_USER_AGENT;
use crate::error::{ImportError, Result};
use chrono::Datelike;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spreadsheet: SpreadsheetConfig,
    pub storage: StorageConfig,
    pub lastfm: LastfmConfig,
    pub musicbrainz: MusicBrainzConfig,
    pub guardian: GuardianConfig,
    pub enrichment: EnrichmentConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpreadsheetConfig {
    pub url: Option<String>,
    pub user_agent: String,
    /// Year the sheet's dates fall in; the current year when unset
    pub reference_year: Option<i32>,
    pub timeout_seconds: u64,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            url: None,
            user_agent: SPREADSHEET_USER_AGENT.to_string(),
            reference_year: None,
            timeout_seconds: 30,
        }
    }
}

impl SpreadsheetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn year_or_current(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("gigs.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LastfmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for LastfmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: crate::apis::lastfm::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub base_url: String,
    /// MusicBrainz rejects requests without an identifying User-Agent
    pub user_agent: String,
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            base_url: crate::apis::musicbrainz::DEFAULT_BASE_URL.to_string(),
            user_agent: format!("gig_scraper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub page_size: u32,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub new_artist_window_days: i64,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: crate::apis::guardian::DEFAULT_BASE_URL.to_string(),
            page_size: 50,
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            new_artist_window_days: 2,
        }
    }
}

impl GuardianConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn new_artist_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.new_artist_window_days)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Pause after each round of external calls
    pub delay_ms: u64,
    pub media_root: PathBuf,
    pub similarity_threshold: f64,
    pub timeout_seconds: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            media_root: PathBuf::from("media"),
            similarity_threshold: 0.25,
            timeout_seconds: 30,
        }
    }
}

impl EnrichmentConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "gig_scraper.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// e.g. "0.0.0.0:9898"; no exporter when unset
    pub listen_addr: Option<String>,
}

impl Config {
    /// Load from `path`, or from `config.toml` when it exists. Environment
    /// variables override the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = var("LASTFM_API_KEY") {
            self.lastfm.api_key = Some(key);
        }
        if let Some(key) = var("GUARDIAN_API_KEY") {
            self.guardian.api_key = Some(key);
        }
        if let Some(url) = var("GIGS_SPREADSHEET_URL") {
            self.spreadsheet.url = Some(url);
        }
        if let Some(path) = var("GIGS_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.storage.database_path, PathBuf::from("gigs.db"));
        assert_eq!(config.guardian.page_size, 50);
        assert_eq!(config.enrichment.delay(), Duration::from_millis(1000));
        assert_eq!(config.enrichment.similarity_threshold, 0.25);
        assert_eq!(config.guardian.retry_policy(), RetryPolicy::default());
        assert!(config.metrics.listen_addr.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [spreadsheet]
            url = "https://docs.example/export?format=csv"
            reference_year = 2011

            [guardian]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.spreadsheet.year_or_current(), 2011);
        assert_eq!(config.spreadsheet.timeout_seconds, 30);
        assert_eq!(config.guardian.retry_policy().max_attempts, 2);
        assert_eq!(config.guardian.new_artist_window(), chrono::Duration::days(2));
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("LASTFM_API_KEY", "lastfm-key"),
            ("GUARDIAN_API_KEY", " "),
            ("GIGS_DATABASE_PATH", "/tmp/gigs.db"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.lastfm.api_key.as_deref(), Some("lastfm-key"));
        assert!(config.guardian.api_key.is_none());
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/gigs.db"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }
}
