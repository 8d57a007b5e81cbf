//! Sousdaemon configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main sousdaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Collaborator call handling
    pub router: RouterConfig,

    /// Recommendation scoring
    pub ranker: RankerConfig,

    /// Recipe search configuration
    pub search: SearchConfig,

    /// Recipe adaptation configuration
    pub adapter: AdapterConfig,

    /// Session lifecycle configuration
    pub session: SessionConfig,

    /// Pantry storage configuration
    pub pantry: PantryConfig,

    /// Event log configuration
    pub events: EventsConfig,

    /// Substitution catalog configuration
    pub catalog: CatalogConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables are set for the chosen
    /// providers. Call this early in startup to fail fast.
    pub fn validate(&self) -> Result<()> {
        if self.llm.provider != "local" && std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.embedding.provider != "local" && std::env::var(&self.embedding.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Embedding API key not found. Set the {} environment variable.",
                self.embedding.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .sousdaemon.yml
        let local_config = PathBuf::from(".sousdaemon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/sousdaemon/sousdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sousdaemon").join("sousdaemon.yml");
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

    /// Load just the log-level key (used before full config load, so a
    /// broken config file still gets readable startup logging)
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => {
                let local = PathBuf::from(".sousdaemon.yml");
                if local.exists() {
                    local
                } else {
                    dirs::config_dir()?.join("sousdaemon").join("sousdaemon.yml")
                }
            }
        };
        let content = fs::read_to_string(path).ok()?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
        value.get("log-level")?.as_str().map(|s| s.to_string())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
///
/// Providers: "local" (no network, deterministic rule fallbacks carry every
/// turn), "openai", or "openai-compatible" (any endpoint speaking the same
/// chat-completions protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name ("local", "openai", "openai-compatible")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Vector dimensions for the local hash embedder
    #[serde(rename = "local-dims")]
    pub local_dims: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            local_dims: 256,
        }
    }
}

/// Collaborator call handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-call timeout for collaborator requests, in seconds
    #[serde(rename = "call-timeout-secs")]
    pub call_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { call_timeout_secs: 4 }
    }
}

/// Recommendation scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Maximum missing ingredients a candidate may have
    #[serde(rename = "allow-missing")]
    pub allow_missing: usize,

    /// How much allow-missing grows on the single relaxation retry
    #[serde(rename = "relax-increment")]
    pub relax_increment: usize,

    /// Days ahead that count as "expiring soon"
    #[serde(rename = "expiring-window-days")]
    pub expiring_window_days: i64,

    /// Composite weight for pantry coverage
    #[serde(rename = "weight-coverage")]
    pub weight_coverage: f64,

    /// Composite weight for semantic similarity
    #[serde(rename = "weight-similarity")]
    pub weight_similarity: f64,

    /// Composite weight for the expiration bonus
    #[serde(rename = "weight-expiration")]
    pub weight_expiration: f64,

    /// Cap on the summed expiration bonus, in points
    #[serde(rename = "expiration-bonus-cap")]
    pub expiration_bonus_cap: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            allow_missing: 2,
            relax_increment: 2,
            expiring_window_days: 7,
            weight_coverage: 0.55,
            weight_similarity: 0.30,
            weight_expiration: 0.15,
            expiration_bonus_cap: 40.0,
        }
    }
}

/// Recipe search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// How many candidates the index returns per query
    #[serde(rename = "top-k")]
    pub top_k: usize,

    /// Recipe corpus file (YAML)
    #[serde(rename = "recipes-path")]
    pub recipes_path: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 12,
            recipes_path: PathBuf::from("recipes.yml"),
        }
    }
}

/// Recipe adaptation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Servings to scale to when the user does not say
    #[serde(rename = "default-servings")]
    pub default_servings: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self { default_servings: 2 }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is evicted
    #[serde(rename = "idle-timeout-secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between idle sweeps
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

/// Pantry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PantryConfig {
    /// SQLite database path
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,

    /// Days ahead the expiring report looks
    #[serde(rename = "expiring-report-days")]
    pub expiring_report_days: u32,
}

impl Default for PantryConfig {
    fn default() -> Self {
        let db_path = dirs::data_local_dir()
            .map(|d| d.join("sousdaemon"))
            .unwrap_or_else(|| PathBuf::from(".sousdaemon"))
            .join("pantry.db");

        Self {
            db_path,
            expiring_report_days: pantrystore::DEFAULT_EXPIRING_DAYS,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Directory for per-session JSONL event logs
    #[serde(rename = "log-dir")]
    pub log_dir: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        let log_dir = dirs::data_local_dir()
            .map(|d| d.join("sousdaemon"))
            .unwrap_or_else(|| PathBuf::from(".sousdaemon"))
            .join("events");

        Self { log_dir }
    }
}

/// Substitution catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog file (YAML); the builtin table is used when unset
    pub path: Option<PathBuf>,
}

/// Prompt template overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory holding user `.pmt` overrides
    #[serde(rename = "user-dir")]
    pub user_dir: Option<PathBuf>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            user_dir: dirs::config_dir().map(|d| d.join("sousdaemon").join("prompts")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "local");
        assert_eq!(config.router.call_timeout_secs, 4);
        assert_eq!(config.ranker.allow_missing, 2);
        assert_eq!(config.ranker.expiring_window_days, 7);
        assert_eq!(config.search.top_k, 12);
        assert_eq!(config.adapter.default_servings, 2);
        assert_eq!(config.session.idle_timeout_secs, 1800);
    }

    #[test]
    fn test_ranker_weights_sum_to_one() {
        let ranker = RankerConfig::default();
        let sum = ranker.weight_coverage + ranker.weight_similarity + ranker.weight_expiration;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: openai
  model: gpt-4o
  api-key-env: MY_API_KEY
  base-url: https://api.example.com/v1

ranker:
  allow-missing: 3
  expiring-window-days: 5

session:
  idle-timeout-secs: 600
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.ranker.allow_missing, 3);
        assert_eq!(config.ranker.expiring_window_days, 5);
        assert_eq!(config.session.idle_timeout_secs, 600);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
search:
  top-k: 20
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.search.top_k, 20);

        // Defaults for unspecified
        assert_eq!(config.llm.provider, "local");
        assert_eq!(config.ranker.relax_increment, 2);
        assert_eq!(config.ranker.expiration_bonus_cap, 40.0);
    }

    #[test]
    fn test_validate_local_needs_no_keys() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sousdaemon.yml");
        std::fs::write(&path, "log-level: debug\n").unwrap();

        assert_eq!(Config::load_log_level(Some(&path)), Some("debug".to_string()));
    }
}
