//! Configuration for typomat

use crate::TypomatError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name, used for the cache and config directories
pub const APP_NAME: &str = "typomat";

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "TYPOMAT_CACHE_DIR";

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Typomat Configuration

[indexing]
# Files of this size (bytes) or larger are never tokenized
max_file_size = 24000000
# Bytes read from the start of a file to decide whether it is text
text_lookahead = 512
# Buffered tokens that trigger a write to the store
token_buffer_size = 10000
# Results a worker may queue ahead of the writer
channel_capacity = 64
# Per-file failures tolerated before a run aborts (0 = strict)
max_file_errors = 0
# Worker count (defaults to available parallelism)
# max_workers = 4

[tokens]
# Tokens must be strictly longer than this
min_token_len = 2
# Tokens must be strictly shorter than this
max_token_len = 12
# Words this long or longer are skipped before tokenization
max_word_len = 24

[store]
# Where per-directory databases live (defaults to the user cache dir)
# cache_dir = "/path/to/cache"
# Rows per insert statement (capped by SQLite's bind-variable limit)
batch_size = 100
# Open store handles kept per process
max_open_stores = 8

[discovery]
# Root-level ignore file honored while listing files
ignore_file = ".gitignore"
# Additional glob patterns to skip
exclude = []
"#;

/// Typomat configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_text_lookahead")]
    pub text_lookahead: usize,
    #[serde(default = "default_token_buffer_size")]
    pub token_buffer_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub max_file_errors: usize,
    #[serde(default)]
    pub max_workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default = "default_max_token_len")]
    pub max_token_len: usize,
    #[serde(default = "default_max_word_len")]
    pub max_word_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_open_stores")]
    pub max_open_stores: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

// Default value functions
fn default_max_file_size() -> u64 {
    24_000_000
}
fn default_text_lookahead() -> usize {
    512
}
fn default_token_buffer_size() -> usize {
    10_000
}
fn default_channel_capacity() -> usize {
    64
}
fn default_min_token_len() -> usize {
    2
}
fn default_max_token_len() -> usize {
    12
}
fn default_max_word_len() -> usize {
    24
}
fn default_batch_size() -> usize {
    100
}
fn default_max_open_stores() -> usize {
    8
}
fn default_ignore_file() -> String {
    ".gitignore".to_string()
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            text_lookahead: default_text_lookahead(),
            token_buffer_size: default_token_buffer_size(),
            channel_capacity: default_channel_capacity(),
            max_file_errors: 0,
            max_workers: None,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            max_token_len: default_max_token_len(),
            max_word_len: default_max_word_len(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            batch_size: default_batch_size(),
            max_open_stores: default_max_open_stores(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ignore_file: default_ignore_file(),
            exclude: Vec::new(),
        }
    }
}

impl TokenConfig {
    /// Whether a token's length lies strictly between the configured bounds
    pub fn accepts_token(&self, token: &str) -> bool {
        let len = token.chars().count();
        self.min_token_len < len && len < self.max_token_len
    }

    /// Whether a whitespace-delimited word is short enough to tokenize
    pub fn accepts_word(&self, word: &str) -> bool {
        word.chars().count() < self.max_word_len
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TypomatError::file_op(path, e))?;
        Self::from_toml(&content)
    }

    /// Load the user config file if one exists, defaults otherwise
    pub fn load_default() -> crate::Result<Self> {
        match Self::user_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| TypomatError::ConfigParse(e.to_string()))
    }

    /// `<config_dir>/typomat/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME).join("config.toml"))
    }

    /// Resolve the cache directory: config value, then env var, then user cache dir
    pub fn cache_dir(&self) -> crate::Result<PathBuf> {
        if let Some(dir) = &self.store.cache_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::cache_dir()
            .map(|d| d.join(APP_NAME))
            .ok_or(TypomatError::NoCacheDir)
    }

    /// Worker count for the indexing pool
    pub fn worker_count(&self) -> usize {
        self.indexing
            .max_workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    /// Config rooted at an explicit cache directory (handy for tools and tests)
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store.cache_dir = Some(dir.into());
        self
    }
}
