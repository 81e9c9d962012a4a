//! TOML-based configuration for the knowledge-base server
//!
//! Every component is built from an explicit [`KbConfig`] value; nothing reads
//! configuration from process-wide state after startup.
//!
//! # Hot Reloading
//!
//! [`ConfigManager`] keeps the current configuration behind an `ArcSwap` and can
//! watch the file for changes. An invalid edit is logged and the previous
//! configuration stays active.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::types::AppError;

/// Root configuration structure loaded from kbase.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub rag: RagConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

// ============= Model Gateway Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Upper bound for a single embedding or generation round-trip
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_chat_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============= Vector Index Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexProvider {
    Memory,
    Qdrant,
}

impl std::fmt::Display for IndexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexProvider::Memory => write!(f, "memory"),
            IndexProvider::Qdrant => write!(f, "qdrant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_provider")]
    pub provider: IndexProvider,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Environment variable holding the Qdrant API key
    pub api_key_env: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_index_provider() -> IndexProvider {
    if cfg!(feature = "qdrant") {
        IndexProvider::Qdrant
    } else {
        IndexProvider::Memory
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection() -> String {
    "knowledge_base".to_string()
}

fn default_dimensions() -> usize {
    1024
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            url: default_qdrant_url(),
            api_key_env: None,
            collection: default_collection(),
            dimensions: default_dimensions(),
        }
    }
}

// ============= Catalog Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// SQLite file path, or ":memory:"
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

fn default_catalog_path() -> String {
    "./data/kbase.db".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

// ============= RAG Configuration =============

/// Search-stage similarity threshold applied by the vector index.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.3;

/// Answer-stage similarity threshold applied before context assembly.
pub const DEFAULT_ANSWER_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,

    #[serde(default = "default_answer_threshold")]
    pub answer_threshold: f32,

    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    1
}

fn default_search_threshold() -> f32 {
    DEFAULT_SEARCH_THRESHOLD
}

fn default_answer_threshold() -> f32 {
    DEFAULT_ANSWER_THRESHOLD
}

fn default_preview_chars() -> usize {
    200
}

fn default_upload_dir() -> String {
    "./uploads".to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            search_threshold: default_search_threshold(),
            answer_threshold: default_answer_threshold(),
            preview_chars: default_preview_chars(),
            upload_dir: default_upload_dir(),
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

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl KbConfig {
    /// Load, apply environment overrides and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: KbConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::FileNotFound(missing)) => {
                warn!("Config file {:?} not found, using defaults", missing);
                let mut config = KbConfig::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Environment variables take precedence over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.ollama.base_url = if host.starts_with("http") {
                host
            } else {
                format!("http://{}", host)
            };
        }
        if let Ok(model) = std::env::var("OLLAMA_CHAT_MODEL") {
            self.ollama.chat_model = model;
        }
        if let Ok(model) = std::env::var("OLLAMA_EMBEDDING_MODEL") {
            self.ollama.embedding_model = model;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.index.url = url;
        }
    }

    /// Validate values that would otherwise fail deep inside a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "rag.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.rag.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "rag.top_k must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("rag.search_threshold", self.rag.search_threshold),
            ("rag.answer_threshold", self.rag.answer_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }
        if self.rag.search_threshold > self.rag.answer_threshold {
            return Err(ConfigError::ValidationError(format!(
                "rag.search_threshold ({}) must not exceed rag.answer_threshold ({})",
                self.rag.search_threshold, self.rag.answer_threshold
            )));
        }
        if self.index.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "index.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.ollama.chat_model.trim().is_empty() || self.ollama.embedding_model.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "ollama.chat_model and ollama.embedding_model must be set".to_string(),
            ));
        }
        reqwest::Url::parse(&self.ollama.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "ollama.base_url '{}' is not a valid URL: {}",
                self.ollama.base_url, e
            ))
        })?;
        if let Some(ref env) = self.index.api_key_env {
            self.validate_env_var(env)?;
        }
        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Qdrant API key, if one is configured.
    pub fn index_api_key(&self) -> Option<String> {
        self.index
            .api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct ConfigManager {
    config: Arc<ArcSwap<KbConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl ConfigManager {
    /// Load the initial config; a missing file falls back to defaults.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = KbConfig::load_or_default(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config (useful for testing).
    /// It has no backing file to watch.
    pub fn from_config(config: KbConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("kbase.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<KbConfig> {
        self.config.load_full()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = KbConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching the config file. Of the reloaded values only the
    /// default `rag.top_k` is read per request; everything else applies on restart.
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload = std::time::Instant::now();
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.elapsed() < debounce_duration {
                    continue;
                }

                // let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match KbConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = std::time::Instant::now();
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None),
        }
    }
}
