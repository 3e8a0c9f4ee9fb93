use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::gateway::openai::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/verbatim)
    pub data_dir: PathBuf,
    /// User settings file
    pub settings_file: PathBuf,
    /// Default location for classification outputs
    pub results_dir: PathBuf,
}

impl Config {
    /// Load configuration or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verbatim");
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            settings_file: data_dir.join("settings.json"),
            results_dir: data_dir.join("results"),
            data_dir,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.results_dir)?;
        Ok(())
    }
}

/// Classifier provider stored in settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// OpenAI-compatible API; without a key the keyword matcher is used
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_embedding_model")]
        embedding_model: String,
        #[serde(default = "default_base_url")]
        base_url: String,
    },
    /// Local keyword matching
    Keyword,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::OpenAi {
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            base_url: default_base_url(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// User-tunable pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Comments per batch call
    pub batch_size: usize,
    /// Cap on in-flight external calls per job
    pub max_concurrent_calls: usize,
    /// Labels below this confidence (0-100) are re-checked semantically
    pub confidence_threshold: f64,
    /// Poll interval of progress streams
    pub progress_poll_ms: u64,
    /// Lifetime of stored progress records and results
    pub progress_ttl_secs: u64,
    /// Retries of a failed HTTP call after the first attempt
    pub max_retries: usize,
    pub request_timeout_secs: Option<u64>,
    pub provider: ProviderConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 15,
            max_concurrent_calls: 10,
            confidence_threshold: 70.0,
            progress_poll_ms: 500,
            progress_ttl_secs: 24 * 60 * 60,
            max_retries: 2,
            request_timeout_secs: None,
            provider: ProviderConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Invalid settings file, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source.
    ///
    /// Reads `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `VERBATIM_BATCH_SIZE` and
    /// `VERBATIM_MAX_CONCURRENCY`. Unparseable numbers are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            match &mut self.provider {
                ProviderConfig::OpenAi { api_key, .. } => *api_key = Some(key),
                ProviderConfig::Keyword => {
                    tracing::debug!("OPENAI_API_KEY set but keyword provider selected")
                }
            }
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            if let ProviderConfig::OpenAi { base_url, .. } = &mut self.provider {
                *base_url = url;
            }
        }
        if let Some(size) = lookup("VERBATIM_BATCH_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.batch_size = size;
        }
        if let Some(cap) = lookup("VERBATIM_MAX_CONCURRENCY").and_then(|v| v.trim().parse().ok())
        {
            self.max_concurrent_calls = cap;
        }
        self
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be at least 1");
        anyhow::ensure!(
            self.max_concurrent_calls > 0,
            "max_concurrent_calls must be at least 1"
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.confidence_threshold),
            "confidence_threshold must be between 0 and 100, got {}",
            self.confidence_threshold
        );
        anyhow::ensure!(self.progress_poll_ms > 0, "progress_poll_ms must be positive");
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms)
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.batch_size, 15);
        assert_eq!(settings.max_concurrent_calls, 10);
        assert_eq!(settings.confidence_threshold, 70.0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            batch_size: 20,
            provider: ProviderConfig::Keyword,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"max_concurrent_calls": 3, "provider": {"type": "openai", "api_key": "sk-x"}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.max_concurrent_calls, 3);
        assert_eq!(settings.batch_size, 15);
        match settings.provider {
            ProviderConfig::OpenAi { api_key, model, .. } => {
                assert_eq!(api_key.as_deref(), Some("sk-x"));
                assert_eq!(model, DEFAULT_MODEL);
            }
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("VERBATIM_BATCH_SIZE", "8"),
            ("VERBATIM_MAX_CONCURRENCY", "not a number"),
        ]
        .into_iter()
        .collect();
        let settings =
            Settings::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.max_concurrent_calls, 10);
        assert!(matches!(
            settings.provider,
            ProviderConfig::OpenAi { api_key: Some(ref k), .. } if k == "sk-env"
        ));
    }

    #[test]
    fn test_validate() {
        assert!(Settings::default().validate().is_ok());
        let bad = Settings {
            batch_size: 0,
            ..Settings::default()
        };
        assert!(bad.validate().is_err());
        let bad = Settings {
            confidence_threshold: 120.0,
            ..Settings::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_paths() {
        let config = Config::with_data_dir(PathBuf::from("/tmp/verbatim-test"));
        assert_eq!(
            config.settings_file,
            PathBuf::from("/tmp/verbatim-test/settings.json")
        );
        assert!(Config::load_or_default().data_dir.ends_with("verbatim"));
    }
}
