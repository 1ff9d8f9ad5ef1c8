use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::memory::ranking::RankingStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ContextMemoryConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub search: SearchConfig,
    pub retention: RetentionConfig,
    pub auto_save: AutoSaveConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub ranking: RankingStrategy,
    /// Per-extra-source multiplier used by [`RankingStrategy::SourceBoost`].
    pub source_boost: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub checkpoints_per_session: usize,
    pub checkpoint_max_age_days: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub dedup_window_minutes: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_data_dir()
            .join("context.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            ranking: RankingStrategy::RawScore,
            source_boost: 0.25,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            checkpoints_per_session: 3,
            checkpoint_max_age_days: None,
        }
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            dedup_window_minutes: 5,
        }
    }
}

/// Returns `~/.claude/context-memory/`
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("context-memory")
}

/// Returns the default config file path: `~/.claude/context-memory/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl ContextMemoryConfig {
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
            ContextMemoryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (CONTEXT_MEMORY_DB_PATH, CONTEXT_MEMORY_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CONTEXT_MEMORY_DB_PATH") {
            if !val.is_empty() {
                self.storage.db_path = val;
            }
        }
        if let Ok(val) = std::env::var("CONTEXT_MEMORY_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
