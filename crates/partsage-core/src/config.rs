//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_LLM__API_KEY`). Every section has
//! defaults so a missing file still yields a usable `Settings`.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Loads `config.toml` and the `config.<env>.toml` overlay from `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| ConfigError::Extract { key: key.to_string(), reason: e.to_string() })
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        self.figment
            .extract()
            .map_err(|e| ConfigError::Extract { key: "<root>".to_string(), reason: e.to_string() })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub conversation: ConversationSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.max_context_items == 0 {
            return Err(ConfigError::InvalidConfig("retrieval.max_context_items must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.low_confidence) {
            return Err(ConfigError::InvalidConfig("retrieval.low_confidence must be within [0, 1]".into()));
        }
        if self.retrieval.filter_scan_limit < self.retrieval.max_context_items {
            return Err(ConfigError::InvalidConfig("retrieval.filter_scan_limit must cover max_context_items".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidConfig("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataSettings {
    pub catalog_dir: String,
    pub text_index_dir: String,
    pub vector_db_dir: String,
    pub vector_table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            catalog_dir: "../dev_data/catalog".to_string(),
            text_index_dir: "../dev_data/indexes/tantivy".to_string(),
            vector_db_dir: "../dev_data/indexes/lancedb".to_string(),
            vector_table: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub classify_temperature: f32,
    pub answer_temperature: f32,
    pub classify_max_tokens: u32,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: String::new(),
            timeout_ms: 20_000,
            classify_temperature: 0.1,
            answer_temperature: 1.0,
            classify_max_tokens: 500,
            max_tokens: 2000,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub dimension: usize,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self { Self { model_dir: None, dimension: 1024, max_len: 256, use_fake: false } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub max_context_items: usize,
    pub structured_timeout_ms: u64,
    pub semantic_timeout_ms: u64,
    pub semantic_k: usize,
    pub structured_limit: usize,
    /// A primary retrieval with fewer hits than this counts as empty.
    pub fallback_threshold: usize,
    pub troubleshooting_min_results: usize,
    /// Intents below this confidence get a widened semantic fallback.
    pub low_confidence: f32,
    pub max_exact_lookups: usize,
    /// Candidates a filtered search examines before price and keyword filters.
    pub filter_scan_limit: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_context_items: 10,
            structured_timeout_ms: 3_000,
            semantic_timeout_ms: 5_000,
            semantic_k: 5,
            structured_limit: 5,
            fallback_threshold: 1,
            troubleshooting_min_results: 2,
            low_confidence: 0.5,
            max_exact_lookups: 3,
            filter_scan_limit: 2_000,
        }
    }
}

impl RetrievalSettings {
    pub fn structured_timeout(&self) -> Duration { Duration::from_millis(self.structured_timeout_ms) }
    pub fn semantic_timeout(&self) -> Duration { Duration::from_millis(self.semantic_timeout_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConversationSettings {
    pub max_history_turns: usize,
    pub max_age_hours: i64,
}

impl Default for ConversationSettings {
    fn default() -> Self { Self { max_history_turns: 10, max_age_hours: 24 } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
