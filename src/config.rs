//! Layered configuration.
//!
//! Sources, lowest to highest precedence:
//! - Built-in defaults
//! - `.specdex/settings.toml` (found by walking up from the current directory)
//! - Environment variables prefixed `SPECDEX_`, with `__` separating nested
//!   levels: `SPECDEX_EMBEDDING__PROVIDER=hashed` sets `embedding.provider`,
//!   `SPECDEX_RETRIEVAL__TOP_K=10` sets `retrieval.top_k`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Directory holding the settings file and the disk store.
pub const CONFIG_DIR: &str = ".specdex";

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .specdex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Logging levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which embedding provider to construct.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Remote embeddings API (OpenAI-compatible).
    Openai,
    /// Deterministic local token hashing, no network.
    Hashed,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProvider,

    /// Model name sent to the remote provider
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding vector dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Environment variable holding the provider API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the embeddings API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chunks embedded per provider call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries for transient provider failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which vector store backend to open.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Disk,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Base directory for the disk backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Wrap the backend in a query cache
    #[serde(default = "default_true")]
    pub cache: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Matches returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Drop matches scoring below this threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_provider() -> EmbeddingProvider {
    EmbeddingProvider::Hashed
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimension() -> usize {
    384
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> usize {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_backend() -> StoreBackend {
    StoreBackend::Disk
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".specdex/store")
}
fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            cache: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| Path::new(CONFIG_DIR).join(SETTINGS_FILE));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore
            // stays part of the field name.
            .merge(
                Env::prefixed("SPECDEX_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by walking up from the current directory.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(SETTINGS_FILE));
            }
        }
        None
    }

    /// Workspace root directory (the ancestor holding the config directory).
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            if ancestor.join(CONFIG_DIR).is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }
        None
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Create a default settings file in the current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = Path::new(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_root = Some(current_dir);
        }
        settings.save(&config_path)?;

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hashed);
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.store.backend, StoreBackend::Disk);
        assert!(settings.store.cache);
        assert_eq!(settings.retrieval.top_k, 5);
        assert!(settings.retrieval.min_score.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[embedding]
provider = "openai"
model = "text-embedding-3-large"
dimension = 1536
batch_size = 32

[store]
backend = "memory"
cache = false

[retrieval]
top_k = 10
min_score = 0.25
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Openai);
        assert_eq!(settings.embedding.model, "text-embedding-3-large");
        assert_eq!(settings.embedding.dimension, 1536);
        assert_eq!(settings.embedding.batch_size, 32);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert!(!settings.store.cache);
        assert_eq!(settings.retrieval.top_k, 10);
        assert_eq!(settings.retrieval.min_score, Some(0.25));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[retrieval]\ntop_k = 3\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hashed);
        assert_eq!(settings.store.backend, StoreBackend::Disk);
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.retrieval.top_k = 7;
        settings.logging.default = "info".to_string();
        settings
            .logging
            .modules
            .insert("store".to_string(), "debug".to_string());

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 7);
        assert_eq!(loaded.logging.default, "info");
        assert_eq!(loaded.logging.modules["store"], "debug");
    }
}
