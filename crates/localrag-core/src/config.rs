//! Lightweight configuration loader, engine settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_ENGINE__CHUNK_SIZE=500`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkerConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[engine]` section, or defaults when the section is absent.
    pub fn engine(&self) -> Result<EngineConfig> {
        if self.figment.find_value("engine").is_err() {
            return Ok(EngineConfig::default());
        }
        self.figment
            .extract_inner::<EngineConfig>("engine")
            .map_err(|e| Error::InvalidConfig(format!("engine: {}", e)))
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                let engine = self.engine()?;
                if matches!(engine.cache, CacheSettings::Disabled) {
                    tracing::warn!("response cache is disabled in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

/// How raw vector distances become similarity scores in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `(1 + cos) / 2`, clamped.
    Cosine,
    /// `1 / (1 + exp(d - midpoint))` over squared Euclidean distance `d`.
    L2 {
        #[serde(default = "default_l2_midpoint")]
        midpoint: f32,
    },
}

impl Default for DistanceMetric {
    fn default() -> Self { Self::Cosine }
}

fn default_l2_midpoint() -> f32 { 1.0 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(alias = "max_retries")]
    pub max_retries: u32,
    #[serde(alias = "initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(alias = "max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(alias = "backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3, initial_delay_ms: 50, max_delay_ms: 1_000, backoff_factor: 2.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub db: i64,
    #[serde(alias = "key_prefix")]
    pub key_prefix: String,
    #[serde(alias = "ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(alias = "op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// How long a failed connect is remembered before the next attempt.
    #[serde(alias = "reconnect_cooldown_ms")]
    pub reconnect_cooldown_ms: u64,
    pub retry: RetrySettings,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            key_prefix: "rag:".to_string(),
            ttl_seconds: 3600,
            op_timeout_ms: 2_000,
            reconnect_cooldown_ms: 5_000,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileCacheSettings {
    #[serde(alias = "directory_path")]
    pub directory_path: PathBuf,
    #[serde(alias = "ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for FileCacheSettings {
    fn default() -> Self {
        Self { directory_path: PathBuf::from("cache/rag"), ttl_seconds: 3600 }
    }
}

/// Which cache backend the engine talks to. Decided once, at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cacheType", rename_all = "lowercase")]
pub enum CacheSettings {
    Redis(RedisSettings),
    File(FileCacheSettings),
    Disabled,
}

impl Default for CacheSettings {
    fn default() -> Self { Self::File(FileCacheSettings::default()) }
}

/// Bounds of the per-session turn history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistorySettings {
    #[serde(alias = "max_history")]
    pub max_history: usize,
    #[serde(alias = "similarity_threshold")]
    pub similarity_threshold: f32,
    /// Earlier turns offered to the prompt per query.
    #[serde(alias = "relevant_k")]
    pub relevant_k: usize,
}

impl Default for HistorySettings {
    fn default() -> Self { Self { max_history: 10, similarity_threshold: 0.7, relevant_k: 5 } }
}

impl HistorySettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_history == 0 {
            return Err(Error::Validation("history.max_history must be greater than zero".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Validation(format!(
                "history.similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant that answers questions using the provided documents. \
Use only the information in the context. If the context does not contain the answer, say so. \
Be concise and direct.";

/// Settings persisted alongside a saved engine as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(alias = "embeddings_model")]
    pub embeddings_model: String,
    #[serde(alias = "chunk_size")]
    pub chunk_size: usize,
    #[serde(alias = "chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(alias = "max_documents")]
    pub max_documents: usize,
    #[serde(alias = "similarity_threshold")]
    pub similarity_threshold: f32,
    pub metric: DistanceMetric,
    #[serde(alias = "system_prompt")]
    pub system_prompt: String,
    pub cache: CacheSettings,
    pub history: HistorySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embeddings_model: "BAAI/bge-m3".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            max_documents: 3,
            similarity_threshold: 0.6,
            metric: DistanceMetric::Cosine,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            cache: CacheSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

impl EngineConfig {
    /// Check everything `initialize` relies on, before any backend is touched.
    pub fn validate(&self) -> Result<()> {
        if self.embeddings_model.trim().is_empty() {
            return Err(Error::InvalidConfig("embeddings_model is required".into()));
        }
        if self.max_documents == 0 {
            return Err(Error::InvalidConfig("max_documents must be greater than zero".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        self.chunker()?;
        self.history.validate()
    }

    pub fn chunker(&self) -> Result<ChunkerConfig> { ChunkerConfig::new(self.chunk_size, self.chunk_overlap) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
