use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Persistence store configuration.
///
/// The store is an embedded SQLite database, so the "endpoint" is a local
/// file path and no credentials apply.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

/// Embedding client configuration (Ollama embeddings endpoint)
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embeddings_url")]
    pub api_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Fixed dimensionality of the vector index; embeddings of any other
    /// length are rejected.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Generation provider selection plus per-provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// One of "ollama" or "openrouter", resolved once at startup.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_generate_url")]
    pub api_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default = "default_openrouter_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openrouter_model")]
    pub model: String,
    #[serde(default)]
    pub site_url: String,
    #[serde(default)]
    pub site_name: String,
}

/// Online retrieval defaults
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Number of seed chunks returned by vector search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum hop count from a seed during graph expansion.
    #[serde(default = "default_expansion_depth")]
    pub expansion_depth: usize,
    /// Context size cap, enforced on the CLI path only.
    #[serde(default = "default_context_budget")]
    pub context_budget_bytes: usize,
}

/// Offline ingestion tuning
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Bounded worker pool size for concurrent embedding calls.
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// CORS allowlist; empty means any origin (local development).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_embeddings_url() -> String {
    "http://localhost:11434/api/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text:v1.5".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_generate_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_ollama_model() -> String {
    "gemma:2b".to_string()
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_openrouter_model() -> String {
    "deepseek/deepseek-chat-v3-0324:free".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_expansion_depth() -> usize {
    2
}

fn default_context_budget() -> usize {
    8000
}

fn default_chunk_chars() -> usize {
    1000
}

fn default_overlap_chars() -> usize {
    200
}

fn default_embed_workers() -> usize {
    6
}

fn default_http_port() -> u16 {
    8000
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_url: default_embeddings_url(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            ollama: OllamaConfig::default(),
            openrouter: OpenRouterConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_url: default_generate_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openrouter_key_env(),
            model: default_openrouter_model(),
            site_url: String::new(),
            site_name: String::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            expansion_depth: default_expansion_depth(),
            context_budget_bytes: default_context_budget(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
            embed_workers: default_embed_workers(),
        }
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in SCHOLARAG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional; ignore errors
        let _ = dotenv::dotenv();

        let config_path = std::env::var("SCHOLARAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.retrieval.context_budget_bytes == 0 {
            anyhow::bail!("retrieval.context_budget_bytes must be greater than 0");
        }

        if self.ingest.embed_workers == 0 {
            anyhow::bail!("ingest.embed_workers must be greater than 0");
        }

        if self.ingest.overlap_chars >= self.ingest.chunk_chars {
            anyhow::bail!("ingest.overlap_chars must be less than chunk_chars");
        }

        url::Url::parse(&self.embeddings.api_url)
            .with_context(|| format!("embeddings.api_url is not a valid URL: {}", self.embeddings.api_url))?;

        url::Url::parse(&self.generation.ollama.api_url)
            .with_context(|| format!("generation.ollama.api_url is not a valid URL: {}", self.generation.ollama.api_url))?;

        Ok(())
    }

    /// Get store database path
    pub fn db_path(&self) -> &Path {
        &self.store.db_path
    }
}
