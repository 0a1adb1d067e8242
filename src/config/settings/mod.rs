
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::database::lancedb::{EMBEDDING_FIELD, IndexDefinition, MAX_NUM_CANDIDATES, Similarity};
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL};
use crate::generation::{DEFAULT_API_KEY_ENV, DEFAULT_GENERATOR_MODEL, DEFAULT_GENERATOR_URL};
use crate::rerank::{DEFAULT_RERANK_MODEL, DEFAULT_RERANK_URL};

/// Overrides the application directory
pub const HOME_ENV: &str = "RAG_HOME";
/// Overrides `[store] uri`
pub const STORE_URI_ENV: &str = "RAG_STORE_URI";

const APP_DIR_NAME: &str = ".rag-pipeline";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// LanceDB URI; defaults to `<app dir>/vectors`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub collection: String,
    pub index_name: String,
    pub similarity: Similarity,
    /// Row count from which an ANN index is built instead of searching exhaustively
    pub ann_min_rows: usize,
    pub index_poll_interval_secs: u64,
    pub index_ready_timeout_secs: u64,
}

impl Default for StoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            uri: None,
            collection: "knowledge_base".to_string(),
            index_name: "vector_index".to_string(),
            similarity: Similarity::Cosine,
            ann_min_rows: 256,
            index_poll_interval_secs: 5,
            index_ready_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages handed to the prompt
    pub k: usize,
    pub num_candidates: usize,
    /// Document field that is chunked and embedded
    pub text_field: String,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            k: 5,
            num_candidates: 150,
            text_field: "body".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub url: String,
    pub model: String,
    pub top_k: usize,
}

impl Default for RerankerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_RERANK_URL.to_string(),
            model: DEFAULT_RERANK_MODEL.to_string(),
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GENERATOR_URL.to_string(),
            model: DEFAULT_GENERATOR_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid chunk size: {0} (must be at least 16 tokens)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid retrieval limits: k = {0}, num_candidates = {1} (need 1 <= k <= num_candidates <= 10000)")]
    InvalidRetrievalLimits(usize, usize),
    #[error("Invalid {0}: cannot be empty")]
    EmptyName(&'static str),
    #[error("Invalid reranker top_k: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Invalid {0}: must be at least 1 second")]
    InvalidDuration(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Application directory: `$RAG_HOME`, else `~/.rag-pipeline`
    #[inline]
    pub fn app_dir() -> Result<PathBuf, ConfigError> {
        Self::app_dir_with(|name| std::env::var(name).ok())
    }

    /// [`Config::app_dir`] with an explicit environment lookup
    #[inline]
    pub fn app_dir_with<F>(lookup: F) -> Result<PathBuf, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup(HOME_ENV).filter(|v| !v.trim().is_empty()) {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|home| home.join(APP_DIR_NAME))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("rag-pipeline"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default application directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::app_dir().context("Failed to determine application directory")?;
        Self::load(dir)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when absent
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.store.validate()?;
        self.retrieval.validate()?;
        self.reranker.validate()?;
        self.generator.validate()?;
        self.validate_chunking_config()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.chunk_size < 16 {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory holding the SQLite metadata database
    #[inline]
    pub fn metadata_dir(&self) -> &Path {
        self.get_base_dir()
    }

    /// LanceDB URI: `$RAG_STORE_URI`, then `[store] uri`, then `<app dir>/vectors`
    #[inline]
    pub fn store_uri(&self) -> String {
        self.store_uri_with(|name| std::env::var(name).ok())
    }

    #[inline]
    pub fn store_uri_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(STORE_URI_ENV)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.store.uri.clone())
            .unwrap_or_else(|| {
                self.get_base_dir()
                    .join("vectors")
                    .to_string_lossy()
                    .into_owned()
            })
    }

    /// Index definition for the configured collection and embedding model
    #[inline]
    pub fn index_definition(&self, filter_fields: Vec<String>) -> IndexDefinition {
        IndexDefinition {
            name: self.store.index_name.clone(),
            vector_field: EMBEDDING_FIELD.to_string(),
            dimensions: self.ollama.embedding_dimension as usize,
            similarity: self.store.similarity,
            filter_fields,
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl StoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::EmptyName("collection name"));
        }
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::EmptyName("index name"));
        }
        if self.index_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidDuration("index poll interval"));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 || self.k > self.num_candidates || self.num_candidates > MAX_NUM_CANDIDATES
        {
            return Err(ConfigError::InvalidRetrievalLimits(
                self.k,
                self.num_candidates,
            ));
        }
        if self.text_field.trim().is_empty() {
            return Err(ConfigError::EmptyName("text field"));
        }
        Ok(())
    }
}

impl RerankerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        Ok(())
    }
}

impl GeneratorConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::EmptyName("API key variable"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidDuration("generator timeout"));
        }
        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(2..=8192).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(2..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}
