//! Configuration Management

use crate::collaborator::client::{ChatCompletionsClient, Provider};
use crate::collaborator::{GenerationSettings, ResponseCache, RetryPolicy};
use crate::records::types::DescriptionSource;
use crate::report::OutputDirs;
use crate::scoring::{metric_by_name, ScoreGrouping};
use crate::stats::StatsSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Record loading
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Text-generation collaborator
    #[serde(default)]
    pub collaborator: CollaboratorConfig,
    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Alignment and similarity
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Statistical tests
    #[serde(default)]
    pub stats: StatsConfig,
    /// Report locations
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Largest share of records that may be excluded before loading aborts
    pub max_exclusion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub provider: Provider,
    /// Base URL; Azure falls back to `AZURE_OPENAI_ENDPOINT`
    pub endpoint: Option<String>,
    /// Azure `api-version` query parameter
    pub api_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Per-attempt timeout (seconds)
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Backoff unit (ms)
    pub backoff_base_ms: u64,
    /// Requests in flight at once
    pub concurrency: usize,
    /// Usage scenario in the classification prompt; the hybrid-meeting
    /// scenario when unset
    pub prediction_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// `jaccard` or `cosine`
    pub similarity_metric: String,
    /// Description source similarity is measured against
    pub reference_source: String,
    /// Minimum similarity for snapping a free-text answer onto the vocabulary
    pub min_snap_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub alpha: f64,
    /// Yates continuity correction on 2x2 tables
    pub yates_correction: bool,
    pub grouping: ScoreGrouping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub outputs_dir: PathBuf,
    pub pgf_dir: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_exclusion_rate: 0.2 }
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        let generation = GenerationSettings::default();
        Self {
            provider: Provider::OpenAi,
            endpoint: None,
            api_version: "2024-02-01".to_string(),
            model: generation.model,
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
            timeout_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 1000,
            concurrency: 4,
            prediction_context: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: Config::home_dir().join("cache"),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            similarity_metric: "jaccard".to_string(),
            reference_source: DescriptionSource::HumanStructured.to_string(),
            min_snap_similarity: 0.5,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        let settings = StatsSettings::default();
        Self {
            alpha: settings.alpha,
            yates_correction: settings.yates_correction,
            grouping: settings.grouping,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            outputs_dir: PathBuf::from("outputs"),
            pgf_dir: PathBuf::from("pgf"),
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    /// Returns Ok(()) if valid, or Err with a description of the first invalid field.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(0.0..=1.0).contains(&self.loader.max_exclusion_rate) {
            return Err(crate::Error::Config(format!(
                "max_exclusion_rate must be in [0, 1], got {}",
                self.loader.max_exclusion_rate
            )));
        }

        let c = &self.collaborator;
        if c.model.trim().is_empty() {
            return Err(crate::Error::Config("model must not be empty".to_string()));
        }
        if c.max_tokens == 0 {
            return Err(crate::Error::Config("max_tokens must be > 0".to_string()));
        }
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(crate::Error::Config(format!(
                "temperature must be in [0, 2], got {}",
                c.temperature
            )));
        }
        if !(c.top_p > 0.0 && c.top_p <= 1.0) {
            return Err(crate::Error::Config(format!("top_p must be in (0, 1], got {}", c.top_p)));
        }
        if c.timeout_secs == 0 {
            return Err(crate::Error::Config("timeout_secs must be > 0".to_string()));
        }
        if c.max_attempts == 0 {
            return Err(crate::Error::Config("max_attempts must be > 0".to_string()));
        }
        if c.concurrency == 0 {
            return Err(crate::Error::Config("concurrency must be > 0".to_string()));
        }
        if c.prediction_context.as_deref().is_some_and(|context| context.trim().is_empty()) {
            return Err(crate::Error::Config("prediction_context must not be blank".to_string()));
        }

        metric_by_name(&self.scoring.similarity_metric)?;
        self.reference_source()?;
        if !(0.0..=1.0).contains(&self.scoring.min_snap_similarity) {
            return Err(crate::Error::Config(format!(
                "min_snap_similarity must be in [0, 1], got {}",
                self.scoring.min_snap_similarity
            )));
        }

        if !(self.stats.alpha > 0.0 && self.stats.alpha < 1.0) {
            return Err(crate::Error::Config(format!(
                "alpha must be in (0, 1), got {}",
                self.stats.alpha
            )));
        }
        Ok(())
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from default location
    pub fn load_default() -> Result<Self, crate::Error> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save to default location
    pub fn save_default(&self) -> Result<(), crate::Error> {
        self.save(&Self::default_path())
    }

    /// `~/.elicit_eval`
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".elicit_eval"))
            .unwrap_or_else(|| PathBuf::from(".elicit_eval"))
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Generate TOML representation
    pub fn to_toml(&self) -> Result<String, crate::Error> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Look up a value by dotted key, e.g. `collaborator.model`
    pub fn get(&self, key: &str) -> Result<Option<String>, crate::Error> {
        let mut value = toml::Value::try_from(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        for part in key.split('.') {
            match value.get(part) {
                Some(next) => value = next.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(match value {
            toml::Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    pub fn reference_source(&self) -> Result<DescriptionSource, crate::Error> {
        self.scoring
            .reference_source
            .parse()
            .map_err(|e| crate::Error::Config(format!("reference_source: {}", e)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.collaborator.max_attempts,
            base_delay: Duration::from_millis(self.collaborator.backoff_base_ms),
            timeout: Duration::from_secs(self.collaborator.timeout_secs),
        }
    }

    /// Sampling settings, optionally for another model than the configured one
    pub fn generation_settings(&self, model: Option<&str>) -> GenerationSettings {
        GenerationSettings {
            model: model.unwrap_or(&self.collaborator.model).to_string(),
            max_tokens: self.collaborator.max_tokens,
            temperature: self.collaborator.temperature,
            top_p: self.collaborator.top_p,
        }
    }

    pub fn stats_settings(&self) -> StatsSettings {
        StatsSettings {
            alpha: self.stats.alpha,
            yates_correction: self.stats.yates_correction,
            grouping: self.stats.grouping,
        }
    }

    pub fn response_cache(&self) -> ResponseCache {
        if self.cache.enabled {
            ResponseCache::filesystem(&self.cache.dir)
        } else {
            ResponseCache::disabled()
        }
    }

    pub fn output_dirs(&self) -> OutputDirs {
        OutputDirs::new(&self.output.outputs_dir, &self.output.pgf_dir)
    }

    pub fn chat_client(&self) -> ChatCompletionsClient {
        ChatCompletionsClient::new(
            self.collaborator.provider,
            self.collaborator.endpoint.clone(),
            self.collaborator.api_version.clone(),
            Duration::from_secs(self.collaborator.timeout_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.loader.max_exclusion_rate, 0.2);
        assert_eq!(config.collaborator.model, "gpt-4o");
        assert_eq!(config.collaborator.max_tokens, 200);
        assert_eq!(config.collaborator.temperature, 0.0);
        assert_eq!(config.collaborator.top_p, 0.1);
        assert_eq!(config.scoring.similarity_metric, "jaccard");
        assert_eq!(config.stats.alpha, 0.05);
        assert!(!config.stats.yates_correction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let toml = Config::default().to_toml().unwrap();
        for section in ["[loader]", "[collaborator]", "[cache]", "[scoring]", "[stats]", "[output]"] {
            assert!(toml.contains(section), "missing {}", section);
        }
        assert!(toml.contains("provider = \"openai\""));
    }

    #[test]
    fn test_default_path() {
        let path = Config::default_path();
        assert!(path.to_string_lossy().contains(".elicit_eval"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.collaborator.provider = Provider::Azure;
        original.collaborator.endpoint = Some("https://example.openai.azure.com".to_string());
        original.stats.grouping = ScoreGrouping::Pair;
        original.scoring.similarity_metric = "cosine".to_string();
        original.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str(
            r#"
[stats]
alpha = 0.01
"#,
        )
        .unwrap();
        assert_eq!(config.stats.alpha, 0.01);
        assert!(!config.stats.yates_correction);
        assert_eq!(config.collaborator, CollaboratorConfig::default());
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_load_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[scoring]\nsimilarity_metric = \"levenshtein\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let cases: [fn(&mut Config); 11] = [
            |c: &mut Config| c.loader.max_exclusion_rate = 1.5,
            |c: &mut Config| c.collaborator.prediction_context = Some("  ".to_string()),
            |c: &mut Config| c.collaborator.model = "  ".to_string(),
            |c: &mut Config| c.collaborator.max_tokens = 0,
            |c: &mut Config| c.collaborator.temperature = 3.0,
            |c: &mut Config| c.collaborator.top_p = 0.0,
            |c: &mut Config| c.collaborator.max_attempts = 0,
            |c: &mut Config| c.collaborator.concurrency = 0,
            |c: &mut Config| c.scoring.reference_source = "robot".to_string(),
            |c: &mut Config| c.scoring.min_snap_similarity = -0.1,
            |c: &mut Config| c.stats.alpha = 1.0,
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn test_get_by_dotted_key() {
        let config = Config::default();
        assert_eq!(config.get("collaborator.model").unwrap().as_deref(), Some("gpt-4o"));
        assert_eq!(config.get("stats.alpha").unwrap().as_deref(), Some("0.05"));
        assert_eq!(config.get("stats.grouping").unwrap().as_deref(), Some("source"));
        assert_eq!(config.get("stats.nope").unwrap(), None);
    }

    #[test]
    fn test_derived_settings() {
        let mut config = Config::default();
        config.collaborator.backoff_base_ms = 250;
        config.cache.enabled = false;

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(config.generation_settings(Some("gpt-4o-mini")).model, "gpt-4o-mini");
        assert_eq!(config.generation_settings(None), GenerationSettings::default());
        assert_eq!(config.reference_source().unwrap(), DescriptionSource::HumanStructured);
        assert!(!config.response_cache().is_enabled());
        assert_eq!(config.stats_settings(), StatsSettings::default());
    }
}
