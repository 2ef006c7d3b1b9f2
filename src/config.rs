//! Engine configuration
//!
//! Limits and defaults used by the expression core. Values can be read from a
//! TOML file and overridden from the environment.
//!
//! ## Environment Variables
//!
//! - `DOCQL_MAX_LIKE_PATTERN_LEN` - maximum length of a compiled LIKE regex
//! - `DOCQL_REGEX_SIZE_LIMIT` - compiled regex size limit in bytes
//! - `DOCQL_LIKE_CACHE_CAPACITY` - per-execution LIKE regex cache entries (0 disables)
//! - `DOCQL_LIKE_ESCAPE` - default LIKE escape character
//! - `DOCQL_PATH_CACHE_CAPACITY` - per-execution parsed field-path cache entries (0 disables)
//!
//! These can also be set in a `.env` file next to the configuration file.

use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{ExprError, ExprResult};

pub const ENV_MAX_LIKE_PATTERN_LEN: &str = "DOCQL_MAX_LIKE_PATTERN_LEN";
pub const ENV_REGEX_SIZE_LIMIT: &str = "DOCQL_REGEX_SIZE_LIMIT";
pub const ENV_LIKE_CACHE_CAPACITY: &str = "DOCQL_LIKE_CACHE_CAPACITY";
pub const ENV_LIKE_ESCAPE: &str = "DOCQL_LIKE_ESCAPE";
pub const ENV_PATH_CACHE_CAPACITY: &str = "DOCQL_PATH_CACHE_CAPACITY";

static DEFAULT_CONFIG: Lazy<EngineConfig> = Lazy::new(EngineConfig::default);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum length of the regex a LIKE pattern expands to
    #[serde(default = "default_max_like_pattern_len")]
    pub max_like_pattern_len: usize,
    /// Compiled regex size limit (bytes)
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,
    /// Entries kept in each execution's LIKE regex cache
    #[serde(default = "default_like_cache_capacity")]
    pub like_cache_capacity: usize,
    /// Escape character used when LIKE has no ESCAPE clause
    #[serde(default = "default_like_escape")]
    pub default_like_escape: char,
    /// Entries kept in each execution's parsed field-path cache
    #[serde(default = "default_path_cache_capacity")]
    pub path_cache_capacity: usize,
}

fn default_max_like_pattern_len() -> usize {
    1024
}

fn default_regex_size_limit() -> usize {
    1 << 20
}

fn default_like_cache_capacity() -> usize {
    256
}

fn default_like_escape() -> char {
    '\\'
}

fn default_path_cache_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_like_pattern_len: default_max_like_pattern_len(),
            regex_size_limit: default_regex_size_limit(),
            like_cache_capacity: default_like_cache_capacity(),
            default_like_escape: default_like_escape(),
            path_cache_capacity: default_path_cache_capacity(),
        }
    }
}

impl EngineConfig {
    /// Shared process-wide defaults
    pub fn global_default() -> &'static EngineConfig {
        &DEFAULT_CONFIG
    }

    pub fn from_toml_str(content: &str) -> ExprResult<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| ExprError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// A `.env` file in the same directory is loaded first (if present) and
    /// environment overrides are applied on top of the file contents.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
        }

        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        tracing::info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `DOCQL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> ExprResult<()> {
        if let Some(v) = env_usize(ENV_MAX_LIKE_PATTERN_LEN)? {
            self.max_like_pattern_len = v;
        }
        if let Some(v) = env_usize(ENV_REGEX_SIZE_LIMIT)? {
            self.regex_size_limit = v;
        }
        if let Some(v) = env_usize(ENV_LIKE_CACHE_CAPACITY)? {
            self.like_cache_capacity = v;
        }
        if let Some(v) = env_usize(ENV_PATH_CACHE_CAPACITY)? {
            self.path_cache_capacity = v;
        }
        if let Ok(s) = std::env::var(ENV_LIKE_ESCAPE) {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => self.default_like_escape = c,
                _ => {
                    tracing::warn!("Ignoring {}: expected a single character", ENV_LIKE_ESCAPE);
                }
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> ExprResult<()> {
        if self.max_like_pattern_len == 0 {
            return Err(ExprError::Config(
                "max_like_pattern_len must be greater than 0".to_string(),
            ));
        }
        if self.regex_size_limit == 0 {
            return Err(ExprError::Config(
                "regex_size_limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> ExprResult<Option<usize>> {
    match std::env::var(name) {
        Ok(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ExprError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
