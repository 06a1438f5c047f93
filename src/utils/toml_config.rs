//! TOML-based configuration for reviewrag
//!
//! Every field has a default, so a missing `reviewrag.toml` yields a working
//! configuration pointed at a local Ollama daemon and the public Gemini API.
//! Credentials are never stored in the file; sections name the environment
//! variable that holds them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Environment variable overriding `[ollama].url`
pub const OLLAMA_URL_ENV: &str = "OLLAMA_URL";
/// Environment variable overriding `[rag].db_path`
pub const DB_PATH_ENV: &str = "REVIEWRAG_DB_PATH";
/// Environment variable overriding `[rag].csv_path`
pub const CSV_PATH_ENV: &str = "REVIEWRAG_CSV_PATH";

/// Root configuration structure loaded from reviewrag.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============= Provider Configuration =============

/// Which backend serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{}', expected 'gemini' or 'ollama'",
                other
            ))),
        }
    }
}

/// Provider, model and sampling temperature for one subcommand.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Environment variable holding the API key
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    /// Checked when `api_key_env` is unset
    #[serde(default = "default_gemini_fallback_key_env")]
    pub fallback_api_key_env: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Retries for rate-limited or failed non-streaming requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gemini_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_gemini_fallback_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            fallback_api_key_env: default_gemini_fallback_key_env(),
            base_url: default_gemini_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key from the environment, primary variable first.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        [&self.api_key_env, &self.fallback_api_key_env]
            .into_iter()
            .filter(|name| !name.is_empty())
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| ConfigError::MissingEnvVar(self.api_key_env.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_num_thread")]
    pub num_thread: u32,

    #[serde(default = "default_num_gpu")]
    pub num_gpu: u32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_num_thread() -> u32 {
    4
}

fn default_num_gpu() -> u32 {
    1
}

fn default_top_k() -> u32 {
    20
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            num_thread: default_num_thread(),
            num_gpu: default_num_gpu(),
            top_k: default_top_k(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ============= Agent Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_gemini_provider")]
    pub provider: ProviderKind,

    #[serde(default = "default_agent_model")]
    pub model: String,

    #[serde(default = "default_agent_temperature")]
    pub temperature: Option<f32>,

    /// Maximum model invocations before the loop gives up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prompt used when `agent` is run without one
    #[serde(default = "default_agent_prompt")]
    pub default_prompt: String,
}

fn default_gemini_provider() -> ProviderKind {
    ProviderKind::Gemini
}

fn default_agent_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_agent_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_max_iterations() -> usize {
    10
}

fn default_system_prompt() -> String {
    "You are my AI assistant, please answer my query to the best of your ability.".to_string()
}

fn default_agent_prompt() -> String {
    "Add 40 + 12 and then multiply the result by 6. Also tell me a joke please.".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: default_gemini_provider(),
            model: default_agent_model(),
            temperature: default_agent_temperature(),
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
            default_prompt: default_agent_prompt(),
        }
    }
}

impl AgentConfig {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            provider: self.provider,
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_gemini_provider")]
    pub provider: ProviderKind,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_chat_temperature")]
    pub temperature: Option<f32>,

    /// Optional system prompt; some hosted models reject one
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_chat_model() -> String {
    "gemma-3-27b-it".to_string()
}

fn default_chat_temperature() -> Option<f32> {
    Some(0.7)
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_gemini_provider(),
            model: default_chat_model(),
            temperature: default_chat_temperature(),
            system_prompt: None,
        }
    }
}

impl ChatConfig {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            provider: self.provider,
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

// ============= RAG Configuration =============

/// How a raw store hit is turned into a relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreConvention {
    /// `1 - distance`; can go negative for distant matches
    #[default]
    OneMinusDistance,
    /// The metric's similarity, higher is better
    Similarity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_ollama_provider")]
    pub provider: ProviderKind,

    /// Generation model
    #[serde(default = "default_rag_model")]
    pub model: String,

    #[serde(default = "default_rag_temperature")]
    pub temperature: Option<f32>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    /// Persistent vector store directory
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Distance metric name (`cosine`, `euclidean`, `dot_product`)
    #[serde(default = "default_distance_metric")]
    pub distance_metric: String,

    /// Maximum documents returned per question
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    #[serde(default)]
    pub score_convention: ScoreConvention,

    /// Documents embedded per request during ingestion
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_ollama_provider() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_rag_model() -> String {
    "qwen3-vl:4b-instruct-q4_K_M".to_string()
}

fn default_rag_temperature() -> Option<f32> {
    Some(0.5)
}

fn default_embedding_model() -> String {
    "embeddinggemma".to_string()
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("./realistic_restaurant_reviews.csv")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./reviews_db")
}

fn default_collection() -> String {
    "restaurant_reviews".to_string()
}

fn default_distance_metric() -> String {
    "cosine".to_string()
}

fn default_k() -> usize {
    2
}

fn default_score_threshold() -> f32 {
    -0.2
}

fn default_embed_batch_size() -> usize {
    32
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            provider: default_ollama_provider(),
            model: default_rag_model(),
            temperature: default_rag_temperature(),
            embedding_model: default_embedding_model(),
            csv_path: default_csv_path(),
            db_path: default_db_path(),
            collection: default_collection(),
            distance_metric: default_distance_metric(),
            k: default_k(),
            score_threshold: default_score_threshold(),
            score_convention: ScoreConvention::default(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

impl RagConfig {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            provider: self.provider,
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    pub fn metric(&self) -> Result<vecstore::DistanceMetric, ConfigError> {
        self.distance_metric
            .parse::<vecstore::DistanceMetric>()
            .map_err(ConfigError::ValidationError)
    }
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' is not set; export it or add it to .env")]
    MissingEnvVar(String),
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::FileNotFound(p)) => {
                debug!(path = %p.display(), "No configuration file, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Parse configuration from a TOML string without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OLLAMA_URL`, `REVIEWRAG_DB_PATH` and `REVIEWRAG_CSV_PATH`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(OLLAMA_URL_ENV) {
            self.ollama.url = url;
        }
        if let Some(path) = non_empty_env(DB_PATH_ENV) {
            self.rag.db_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env(CSV_PATH_ENV) {
            self.rag.csv_path = PathBuf::from(path);
        }
    }

    /// Validate value ranges. Credentials are checked lazily, when a client is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.k == 0 {
            return Err(ConfigError::ValidationError(
                "rag.k must be at least 1".to_string(),
            ));
        }
        if self.rag.embed_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "rag.embed_batch_size must be at least 1".to_string(),
            ));
        }
        if !self.rag.score_threshold.is_finite() {
            return Err(ConfigError::ValidationError(
                "rag.score_threshold must be a finite number".to_string(),
            ));
        }
        if self.rag.collection.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "rag.collection must not be empty".to_string(),
            ));
        }
        self.rag.metric()?;

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }

        for (section, temperature) in [
            ("agent", self.agent.temperature),
            ("chat", self.chat.temperature),
            ("rag", self.rag.temperature),
        ] {
            if let Some(t) = temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(ConfigError::ValidationError(format!(
                        "{}.temperature must be between 0.0 and 2.0, got {}",
                        section, t
                    )));
                }
            }
        }

        for (name, url) in [
            ("ollama.url", &self.ollama.url),
            ("gemini.base_url", &self.gemini.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must start with http:// or https://, got '{}'",
                    name, url
                )));
            }
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
