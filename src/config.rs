//! Configuration management for the companion engine
//!
//! Handles provider selection and the tunable scoring/timing constants.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::llm::ProviderKind;

/// Connection settings for one provider backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Which wire format this provider speaks
    pub kind: ProviderKind,
    /// Base URL (or full URL for OpenAI-compatible servers). Falls back to the
    /// provider's public endpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Model name, or deployment name for Azure OpenAI
    pub model: String,
    /// Azure OpenAI api-version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: None,
            model: model.into(),
            api_version: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }
}

/// Constants used by the heuristic scorer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConstants {
    /// Minimum change of the five-score average that counts as a trend
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,
}

fn default_trend_threshold() -> f64 {
    0.5
}

impl Default for ScoringConstants {
    fn default() -> Self {
        Self {
            trend_threshold: default_trend_threshold(),
        }
    }
}

/// One step of the efficiency score: averages up to `max_ms` score `score`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Breakpoint {
    pub max_ms: u64,
    pub score: f64,
}

/// Constants used by the efficiency timer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConstants {
    /// Ascending by `max_ms`
    pub breakpoints: Vec<Breakpoint>,
    /// Score for averages beyond the last breakpoint
    pub floor: f64,
    pub consistency_bonus_max: f64,
    pub consistency_min_samples: usize,
    /// Sessions longer than this with too few messages are penalised
    pub unproductive_after_ms: u64,
    pub unproductive_min_messages: u32,
    pub unproductive_penalty: f64,
}

impl Default for TimingConstants {
    fn default() -> Self {
        let breakpoints = [
            (2_000, 10.0),
            (5_000, 9.0),
            (10_000, 8.0),
            (20_000, 6.5),
            (30_000, 5.0),
            (45_000, 3.0),
        ]
        .into_iter()
        .map(|(max_ms, score)| Breakpoint { max_ms, score })
        .collect();

        Self {
            breakpoints,
            floor: 1.0,
            consistency_bonus_max: 0.5,
            consistency_min_samples: 3,
            unproductive_after_ms: 10 * 60 * 1000,
            unproductive_min_messages: 5,
            unproductive_penalty: 1.0,
        }
    }
}

/// Delays of the cosmetic "still working" notices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSettings {
    pub delays_secs: Vec<u64>,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            delays_secs: vec![3, 8, 15],
        }
    }
}

/// Companion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider id used when a request does not name one
    pub active_provider: String,
    /// Provider settings keyed by provider id
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub scoring: ScoringConstants,
    #[serde(default)]
    pub timing: TimingConstants,
    #[serde(default)]
    pub progress: ProgressSettings,
    /// Version of config schema (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig::new(ProviderKind::OpenAi, "gpt-4o-mini"),
        );
        providers.insert(
            "azure-openai".to_string(),
            ProviderConfig::new(ProviderKind::AzureOpenAi, "gpt-4o-mini")
                .with_endpoint("https://example.openai.azure.com")
                .with_api_version("2024-02-15-preview"),
        );
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig::new(ProviderKind::Anthropic, "claude-3-5-haiku-latest"),
        );
        providers.insert(
            "local".to_string(),
            ProviderConfig::new(ProviderKind::Local, "llama3.1")
                .with_endpoint("http://localhost:11434"),
        );

        Self {
            active_provider: "openai".to_string(),
            providers,
            scoring: ScoringConstants::default(),
            timing: TimingConstants::default(),
            progress: ProgressSettings::default(),
            version: 1,
        }
    }
}

impl Config {
    /// Get the config file path (~/.companion/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(companion_dir()?.join("config.toml"))
    }

    /// Check if config exists (i.e., not first run)
    pub fn exists() -> bool {
        Self::path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Load config from disk, or return None if it doesn't exist
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::path()?)
    }

    /// Load config from disk, falling back to defaults on first run
    pub fn load_or_default() -> Result<Self> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .context("Failed to read config file")?;
        let config: Self = toml::from_str(&content)
            .context("Failed to parse config file")?;
        Ok(Some(config))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Settings for a provider id, if configured
    pub fn provider(&self, provider_id: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider_id)
    }
}

/// Get the base companion directory path (~/.companion)
pub fn companion_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".companion"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.active_provider, "openai");
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.scoring.trend_threshold, 0.5);
        assert_eq!(config.timing.breakpoints.len(), 6);
    }

    #[test]
    fn test_breakpoints_ascending() {
        let timing = TimingConstants::default();
        for pair in timing.breakpoints.windows(2) {
            assert!(pair[0].max_ms < pair[1].max_ms);
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.providers, parsed.providers);
        assert_eq!(config.timing, parsed.timing);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_str = r#"
            active_provider = "local"

            [providers.local]
            kind = "local"
            model = "mistral"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider("local").unwrap().model, "mistral");
        assert_eq!(config.scoring, ScoringConstants::default());
        assert_eq!(config.progress, ProgressSettings::default());
        assert_eq!(config.version, 1);
    }

    #[test]
    fn test_save_and_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.active_provider = "anthropic".to_string();
        config.scoring.trend_threshold = 0.75;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.active_provider, "anthropic");
        assert_eq!(loaded.scoring.trend_threshold, 0.75);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).unwrap().is_none());
    }
}
