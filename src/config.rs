//! Configuration for index building and search
//!
//! Loads configuration from config.yml file

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};
use crate::hybrid::engine::{DEFAULT_SCORE_EPSILON, DEFAULT_TOP_N};
use crate::hybrid::{HybridConfig, VectorizerConfig};

/// Default constants (fallback if config.yml not found)
pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_CHUNKS_PATH: &str = "all_chunks.json";
pub const DEFAULT_INDEX_DIR: &str = "hybrid_index";
/// Build-time pruning for a whole manual (see `VectorizerConfig::pruned`)
pub const DEFAULT_MAX_DF: f64 = 0.85;
pub const DEFAULT_MIN_DF: usize = 2;

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    index: Option<IndexSection>,
    search: Option<SearchSection>,
    paths: Option<PathsSection>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexSection {
    max_df: Option<f64>,
    min_df: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchSection {
    top_n: Option<usize>,
    score_epsilon: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsSection {
    chunks: Option<String>,
    index_dir: Option<String>,
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub chunks_path: PathBuf,
    pub index_dir: PathBuf,
    pub max_df: f64,
    pub min_df: usize,
    pub top_n: usize,
    pub score_epsilon: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Self {
        let candidates = [PathBuf::from(CONFIG_FILE), Path::new("..").join(CONFIG_FILE)];
        match Self::load_first(&candidates) {
            Ok(Some(config)) => config,
            Ok(None) => Self::defaults().with_env_overrides(),
            Err(err) => {
                warn!("Ignoring invalid {}: {}. Using defaults", CONFIG_FILE, err);
                Self::defaults().with_env_overrides()
            }
        }
    }

    /// Load the first candidate file that exists.
    ///
    /// Missing files are skipped; a file that exists but does not parse or
    /// validate is an error rather than a reason to try the next one.
    pub fn load_first<P: AsRef<Path>>(candidates: &[P]) -> Result<Option<Self>> {
        for path in candidates {
            if !path.as_ref().is_file() {
                continue;
            }
            return Self::load_from_file(path).map(Some);
        }
        Ok(None)
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        match value {
            Some(v) if v.starts_with("${") && v.ends_with('}') => {
                let var_name = &v[2..v.len() - 1];
                std::env::var(var_name).ok()
            }
            other => other,
        }
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let yaml: YamlConfig = if content.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let index = yaml.index.unwrap_or_default();
        let search = yaml.search.unwrap_or_default();
        let paths = yaml.paths.unwrap_or_default();
        let defaults = Self::defaults();

        let config = Self {
            chunks_path: Self::resolve_env_string(paths.chunks, "MANUAL_SEARCH_CHUNKS")
                .map(PathBuf::from)
                .unwrap_or(defaults.chunks_path),
            index_dir: Self::resolve_env_string(paths.index_dir, "MANUAL_SEARCH_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            max_df: index.max_df.unwrap_or(defaults.max_df),
            min_df: index.min_df.unwrap_or(defaults.min_df),
            top_n: search.top_n.unwrap_or(defaults.top_n),
            score_epsilon: search.score_epsilon.unwrap_or(defaults.score_epsilon),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create config with built-in defaults (fallback)
    fn defaults() -> Self {
        Self {
            chunks_path: PathBuf::from(DEFAULT_CHUNKS_PATH),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            max_df: DEFAULT_MAX_DF,
            min_df: DEFAULT_MIN_DF,
            top_n: DEFAULT_TOP_N,
            score_epsilon: DEFAULT_SCORE_EPSILON,
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("MANUAL_SEARCH_CHUNKS") {
            self.chunks_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("MANUAL_SEARCH_INDEX_DIR") {
            self.index_dir = PathBuf::from(dir);
        }
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        self.vectorizer()
            .validate()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        if self.top_n == 0 {
            return Err(Error::ConfigError("search.top_n must be positive".to_string()));
        }
        if !self.score_epsilon.is_finite() || self.score_epsilon < 0.0 {
            return Err(Error::ConfigError(
                "search.score_epsilon must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn vectorizer(&self) -> VectorizerConfig {
        VectorizerConfig {
            max_df: self.max_df,
            min_df: self.min_df,
        }
    }

    /// Engine configuration derived from this config
    pub fn hybrid(&self) -> HybridConfig {
        HybridConfig {
            vectorizer: self.vectorizer(),
            top_n: self.top_n,
            score_epsilon: self.score_epsilon,
        }
    }
}
