//! DeepResearch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main DeepResearch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content generator (LLM) configuration
    pub llm: LlmConfig,

    /// Web search provider configuration
    pub search: SearchConfig,

    /// Page fetch policy
    pub fetch: FetchConfig,

    /// Research state machine tuning
    pub research: ResearchConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Session store configuration
    pub store: StoreConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables are set. Call this early in
    /// startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if std::env::var(&self.search.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Search API key not found. Set the {} environment variable.",
                self.search.api_key_env
            ));
        }
        if self.research.max_iterations == 0 {
            return Err(eyre::eyre!("research.max-iterations must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .deepresearch.yml
        let local_config = PathBuf::from(".deepresearch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/deepresearch/deepresearch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("deepresearch").join("deepresearch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed: a broken config file is reported properly by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".deepresearch.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("deepresearch").join("deepresearch.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Content generator (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for free-text generation
    pub temperature: f32,

    /// Sampling temperature for structured (JSON) generation
    #[serde(rename = "structured-temperature")]
    pub structured_temperature: f32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("{} is not set", self.api_key_env))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4000,
            temperature: 0.2,
            structured_temperature: 0.1,
            timeout_ms: 120_000,
        }
    }
}

/// Web search provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Environment variable containing the search API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Search endpoint URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Result count for the exploratory search that seeds plan generation
    #[serde(rename = "exploratory-results")]
    pub exploratory_results: usize,
}

impl SearchConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("{} is not set", self.api_key_env))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "SERPER_API_KEY".to_string(),
            base_url: "https://google.serper.dev/search".to_string(),
            timeout_ms: 15_000,
            exploratory_results: 3,
        }
    }
}

/// Page fetch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-page timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum response body size in bytes
    #[serde(rename = "max-bytes")]
    pub max_bytes: usize,

    /// Maximum characters kept from a converted page
    #[serde(rename = "max-chars")]
    pub max_chars: usize,

    /// Maximum concurrent page fetches within one web-search stage
    pub concurrency: usize,

    /// User-Agent header sent with page fetches
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// URL extensions treated as binary documents and never fetched
    #[serde(rename = "binary-extensions")]
    pub binary_extensions: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_bytes: 1_000_000,
            max_chars: 50_000,
            concurrency: 8,
            user_agent: "DeepResearch/0.1 (page fetch)".to_string(),
            binary_extensions: [".pdf", ".docx", ".xlsx", ".pptx", ".png", ".jpg", ".jpeg", ".gif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Research state machine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Search cycles after which sufficiency is asserted without asking the model
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Iteration from which the evaluator is asked to be lenient
    #[serde(rename = "lenient-after")]
    pub lenient_after: u32,

    /// Iteration from which the evaluator is asked to be extremely lenient
    #[serde(rename = "very-lenient-after")]
    pub very_lenient_after: u32,

    /// Pause between stages so progress is observable by humans
    #[serde(rename = "stage-pause-ms")]
    pub stage_pause_ms: u64,

    /// Maximum number of sessions running stage chains at once
    #[serde(rename = "max-concurrent-sessions")]
    pub max_concurrent_sessions: usize,

    /// Fallback wake-up interval for progress subscribers
    #[serde(rename = "progress-poll-ms")]
    pub progress_poll_ms: u64,

    /// Fewest clarification questions accepted from the generator
    #[serde(rename = "min-questions")]
    pub min_questions: usize,

    /// Most clarification questions kept
    #[serde(rename = "max-questions")]
    pub max_questions: usize,
}

impl ResearchConfig {
    pub fn stage_pause(&self) -> Duration {
        Duration::from_millis(self.stage_pause_ms)
    }

    pub fn progress_poll(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms)
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            lenient_after: 2,
            very_lenient_after: 3,
            stage_pause_ms: 500,
            max_concurrent_sessions: 16,
            progress_poll_ms: 1000,
            min_questions: 1,
            max_questions: 5,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    #[serde(rename = "cors-origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long terminal sessions are kept before eviction
    #[serde(rename = "retention-secs")]
    pub retention_secs: u64,

    /// How often the eviction sweep runs
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,
}

impl StoreConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.research.max_iterations, 4);
        assert_eq!(config.research.lenient_after, 2);
        assert_eq!(config.research.very_lenient_after, 3);
        assert_eq!(config.fetch.timeout_ms, 10_000);
        assert!(config.fetch.binary_extensions.contains(&".pdf".to_string()));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  model: gpt-4o-mini
  api-key-env: MY_API_KEY
  max-tokens: 2000

research:
  max-iterations: 3
  lenient-after: 1
  stage-pause-ms: 0

server:
  port: 9000
  cors-origins:
    - http://localhost:3000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.research.max_iterations, 3);
        assert_eq!(config.research.lenient_after, 1);
        assert_eq!(config.research.stage_pause(), Duration::ZERO);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
search:
  timeout-ms: 5000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.search.timeout_ms, 5000);
        assert_eq!(config.search.api_key_env, "SERPER_API_KEY");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.store.retention_secs, 86_400);
    }

    #[test]
    fn test_load_explicit_path_and_log_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log-level: DEBUG\nresearch:\n  max-iterations: 2").unwrap();
        let path = file.path().to_path_buf();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.research.max_iterations, 2);
        assert_eq!(Config::load_log_level(Some(&path)), Some("DEBUG".to_string()));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/deepresearch.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_validate_requires_api_keys() {
        let mut config = Config::default();
        config.llm.api_key_env = "DR_TEST_LLM_KEY".to_string();
        config.search.api_key_env = "DR_TEST_SEARCH_KEY".to_string();

        // SAFETY: serialized test, no other thread reads these variables
        unsafe {
            std::env::remove_var("DR_TEST_LLM_KEY");
            std::env::remove_var("DR_TEST_SEARCH_KEY");
        }
        assert!(config.validate().is_err());

        unsafe {
            std::env::set_var("DR_TEST_LLM_KEY", "x");
        }
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("DR_TEST_SEARCH_KEY"));

        unsafe {
            std::env::set_var("DR_TEST_SEARCH_KEY", "y");
        }
        assert!(config.validate().is_ok());

        unsafe {
            std::env::remove_var("DR_TEST_LLM_KEY");
            std::env::remove_var("DR_TEST_SEARCH_KEY");
        }
    }
}
