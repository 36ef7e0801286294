//! Typomat core: turns a directory tree into a corpus of word tokens and
//! draws typing prompts from it.
//!
//! A [`Session`] ties one directory to its token store. Indexing walks the
//! tree, re-tokenizes only files whose `(size, mtime)` changed and prunes
//! files that disappeared; prompts are built by reservoir-sampling the
//! store's distinct tokens.

pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod sample;
pub mod session;
pub mod store;
pub mod tokenize;

pub use config::Config;
pub use error::{ErrorKind, TypomatError};
pub use index::{list_files, FileStatus, IndexStats, Indexer};
pub use metrics::{accuracy, wpm, Score};
pub use session::{Engine, Session};
pub use store::{purge_cache, DirId, StoreRegistry, StoreStatus, TokenStore};
pub use tokenize::{tokenize, tokenize_file};

/// Result type for typomat operations
pub type Result<T> = std::result::Result<T, TypomatError>;
