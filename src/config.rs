//! Resolver Configuration
//!
//! Tunables for the resolution pipeline. Defaults mirror the values the
//! production assistant ran with; every field can be overridden from the
//! environment (`KGQ_*`, `OPENAI_*`) or deserialized from JSON.

use crate::error::{ResolverError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;
pub const DUMMY_API_KEY: &str = "dummy-api-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum cosine similarity for a similar-match cache hit
    pub similarity_threshold: f32,
    /// Number of most recent (sql, analysis) pairs given to the SQL prompt
    pub context_window: usize,
    pub sql_model: String,
    pub rename_model: String,
    pub embedding_model: String,
    pub api_base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub llm_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    pub warehouse_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            context_window: DEFAULT_CONTEXT_WINDOW,
            sql_model: "gpt-4o-mini".to_string(),
            rename_model: "gpt-3.5-turbo-0125".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: DUMMY_API_KEY.to_string(),
            llm_timeout_secs: 60,
            embedding_timeout_secs: 20,
            warehouse_timeout_secs: 120,
        }
    }
}

impl ResolverConfig {
    /// Build a config from defaults overlaid with environment variables.
    ///
    /// A `.env` file in the working directory is honoured.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(v) = std::env::var("KGQ_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v.trim().parse().map_err(|_| {
                ResolverError::Configuration(format!("Invalid KGQ_SIMILARITY_THRESHOLD: {}", v))
            })?;
        }
        if let Ok(v) = std::env::var("KGQ_CONTEXT_WINDOW") {
            config.context_window = v.trim().parse().map_err(|_| {
                ResolverError::Configuration(format!("Invalid KGQ_CONTEXT_WINDOW: {}", v))
            })?;
        }
        if let Ok(v) = std::env::var("KGQ_SQL_MODEL") {
            config.sql_model = v;
        }
        if let Ok(v) = std::env::var("KGQ_RENAME_MODEL") {
            config.rename_model = v;
        }
        if let Ok(v) = std::env::var("KGQ_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            config.api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            config.api_key = v;
        }
        config.llm_timeout_secs = env_secs("KGQ_LLM_TIMEOUT_SECS", config.llm_timeout_secs)?;
        config.embedding_timeout_secs =
            env_secs("KGQ_EMBEDDING_TIMEOUT_SECS", config.embedding_timeout_secs)?;
        config.warehouse_timeout_secs =
            env_secs("KGQ_WAREHOUSE_TIMEOUT_SECS", config.warehouse_timeout_secs)?;

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ResolverError::Configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.context_window == 0 {
            return Err(ResolverError::Configuration(
                "context_window must be at least 1".to_string(),
            ));
        }
        if self.llm_timeout_secs == 0
            || self.embedding_timeout_secs == 0
            || self.warehouse_timeout_secs == 0
        {
            return Err(ResolverError::Configuration(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_dummy(&self) -> bool {
        self.api_key == DUMMY_API_KEY
    }
}

fn env_secs(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ResolverError::Configuration(format!("Invalid {}: {}", name, v))),
        Err(_) => Ok(default),
    }
}
