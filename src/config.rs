use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrellisConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
    pub ranking: RankingConfig,
    pub budget: BudgetConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_ms: i64,
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RankingConfig {
    pub default_limit: usize,
    pub min_score: f64,
    pub fts_weight: f64,
    pub vector_weight: f64,
    pub rrf_k: usize,
    /// Candidate lists are fetched at `default_limit * candidate_multiplier`
    /// before decay/MMR truncate them back down.
    pub candidate_multiplier: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    pub chars_per_token: usize,
    pub overhead_percent: f64,
    pub profile_tokens: usize,
    pub task_state_tokens: usize,
    pub summary_tokens: usize,
    pub events_tokens: usize,
    pub chunks_tokens: usize,
    pub total_tokens: usize,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            ranking: RankingConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_trellis_dir()
            .join("knowledge.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 30 * 24 * 60 * 60 * 1000, // 30 days
            max_entries: 10_000,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_score: 0.0,
            fts_weight: 0.3,
            vector_weight: 0.7,
            rrf_k: 60,
            candidate_multiplier: 3,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            overhead_percent: 0.10,
            profile_tokens: 800,
            task_state_tokens: 1200,
            summary_tokens: 1000,
            events_tokens: 2000,
            chunks_tokens: 3000,
            total_tokens: 8000,
        }
    }
}

/// Returns `~/.trellis/`
pub fn default_trellis_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".trellis")
}

/// Returns the default config file path: `~/.trellis/config.toml`
pub fn default_config_path() -> PathBuf {
    default_trellis_dir().join("config.toml")
}

impl TrellisConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            TrellisConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (TRELLIS_DB, TRELLIS_EMBEDDING_MODEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TRELLIS_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("TRELLIS_EMBEDDING_MODEL") {
            self.embedding.model = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrellisConfig::default();
        assert_eq!(config.ranking.rrf_k, 60);
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.cache.max_entries, 10_000);
        assert!((config.ranking.fts_weight + config.ranking.vector_weight - 1.0).abs() < 1e-9);
        assert!(config.storage.db_path.ends_with("knowledge.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[storage]
db_path = "/tmp/test.db"

[embedding]
provider = "local"
model = "all-MiniLM-L6-v2"
dimensions = 384

[ranking]
default_limit = 20
"#;
        let config: TrellisConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.ranking.default_limit, 20);
        // defaults still apply for unset fields
        assert_eq!(config.ranking.rrf_k, 60);
        assert_eq!(config.budget.chars_per_token, 4);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TrellisConfig::default();
        std::env::set_var("TRELLIS_DB", "/tmp/override.db");
        std::env::set_var("TRELLIS_EMBEDDING_MODEL", "env-model");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.embedding.model, "env-model");

        // Clean up
        std::env::remove_var("TRELLIS_DB");
        std::env::remove_var("TRELLIS_EMBEDDING_MODEL");
    }
}
