//! Configuration management for Recall.
//!
//! Loads configuration from environment variables. Everything the service
//! persists lives under a single data directory: the SQLite database file
//! and (when Qdrant runs embedded alongside) the vector index directory.

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub vector: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct VectorConfig {
    pub url: String,
    pub collection: String,
    /// Per-call timeout; a timed-out call is treated as index-unavailable.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub providers: Vec<EmbeddingProvider>,
    /// Vector dimension when no provider dictates one.
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct EmbeddingProvider {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum age of a record eligible to appear in semantic search
    /// results (the recency horizon).
    pub recency_days: i64,
    /// Candidate pool size for vector queries.
    pub candidate_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env if present; ignore absence
        let _ = dotenvy::dotenv();

        let data_dir = env_var("RECALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let db_path = env_var("RECALL_DB_PATH")
            .unwrap_or_else(|| data_dir.join("recall.db").to_string_lossy().into_owned());

        Self {
            server: ServerConfig {
                host: env_var("RECALL_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: env_parse("RECALL_PORT").unwrap_or(8732),
            },
            database: DatabaseConfig { path: db_path },
            vector: VectorConfig {
                url: env_var("RECALL_QDRANT_URL")
                    .unwrap_or_else(|| "http://localhost:6334".to_string()),
                collection: env_var("RECALL_COLLECTION")
                    .unwrap_or_else(|| "recall_chunks".to_string()),
                timeout: Duration::from_secs(env_parse("RECALL_VECTOR_TIMEOUT_SECS").unwrap_or(3)),
            },
            embedding: EmbeddingConfig {
                providers: embedding_providers_from_env(),
                dimension: env_parse("RECALL_EMBEDDING_DIMENSION").unwrap_or(384),
            },
            search: SearchConfig {
                recency_days: env_parse("RECALL_RECENCY_DAYS").unwrap_or(90),
                candidate_limit: env_parse("RECALL_CANDIDATE_LIMIT").unwrap_or(100),
            },
        }
    }
}

/// Parse embedding providers from environment variables.
///
/// `RECALL_OPENAI_API_KEY` and `RECALL_GEMINI_API_KEY` enable the
/// respective provider; priority is OpenAI first unless overridden via
/// `RECALL_EMBEDDING_PRIORITY=gemini,openai`.
fn embedding_providers_from_env() -> Vec<EmbeddingProvider> {
    let mut providers = Vec::new();

    if let Some(key) = env_var("RECALL_OPENAI_API_KEY") {
        providers.push(EmbeddingProvider {
            name: "openai".to_string(),
            base_url: env_var("RECALL_OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: env_var("RECALL_OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            api_key: key,
            priority: 1,
        });
    }

    if let Some(key) = env_var("RECALL_GEMINI_API_KEY") {
        providers.push(EmbeddingProvider {
            name: "gemini".to_string(),
            base_url: env_var("RECALL_GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: env_var("RECALL_GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-001".to_string()),
            api_key: key,
            priority: 2,
        });
    }

    if let Some(order) = env_var("RECALL_EMBEDDING_PRIORITY") {
        let order: Vec<&str> = order.split(',').map(str::trim).collect();
        providers.sort_by_key(|p| {
            order
                .iter()
                .position(|name| *name == p.name)
                .unwrap_or(usize::MAX)
        });
        for (i, p) in providers.iter_mut().enumerate() {
            p.priority = (i + 1) as u8;
        }
    } else {
        providers.sort_by_key(|p| p.priority);
    }

    providers
}

/// Default data directory: platform data dir + "recall".
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recall")
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}
