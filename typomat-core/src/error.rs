//! Error types for typomat operations

use std::io;
use std::path::PathBuf;

/// Coarse classification of a [`TypomatError`], so callers can render a
/// targeted message without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    FileOperation,
    TextProcessing,
    Store,
    EmptyCorpus,
    TooManyErrors,
    Config,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::FileOperation => "file_operation",
            Self::TextProcessing => "text_processing",
            Self::Store => "store",
            Self::EmptyCorpus => "empty_corpus",
            Self::TooManyErrors => "too_many_errors",
            Self::Config => "config",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TypomatError {
    #[error("Not a directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("File operation failed for {}: {source}", .path.display())]
    FileOperation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to list files under {}: {message}", .root.display())]
    Walk { root: PathBuf, message: String },

    #[error("Failed to tokenize {}: {source}", .path.display())]
    TextProcessing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to open token store at {}: {message}", .path.display())]
    StoreOpen { path: PathBuf, message: String },

    #[error("Schema version mismatch: database is v{found}, expected v{expected}")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    #[error("No files found in {}", .0.display())]
    EmptyDirectory(PathBuf),

    #[error("No tokens found in {}", .0.display())]
    NoTokens(PathBuf),

    #[error("Too many errors while indexing: {count} files failed (limit {limit})")]
    TooManyErrors { count: usize, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("No cache directory available; set TYPOMAT_CACHE_DIR or store.cache_dir")]
    NoCacheDir,
}

impl TypomatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDirectory(_) => ErrorKind::InvalidInput,
            Self::FileOperation { .. } | Self::Walk { .. } | Self::Io(_) => {
                ErrorKind::FileOperation
            }
            Self::TextProcessing { .. } => ErrorKind::TextProcessing,
            Self::Database(_) | Self::StoreOpen { .. } | Self::SchemaVersionMismatch { .. } => {
                ErrorKind::Store
            }
            Self::EmptyDirectory(_) | Self::NoTokens(_) => ErrorKind::EmptyCorpus,
            Self::TooManyErrors { .. } => ErrorKind::TooManyErrors,
            Self::ConfigParse(_) | Self::GlobPattern(_) | Self::NoCacheDir => ErrorKind::Config,
        }
    }

    /// Whether this is a per-file failure that an indexing error budget may absorb.
    pub(crate) fn is_file_local(&self) -> bool {
        matches!(
            self,
            Self::FileOperation { .. } | Self::TextProcessing { .. }
        )
    }

    pub(crate) fn file_op(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileOperation {
            path: path.into(),
            source,
        }
    }
}
