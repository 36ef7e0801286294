//! Incremental indexer: keeps a directory's token store in sync with the tree

mod discovery;
mod eligibility;
mod pipeline;

pub use discovery::list_files;
pub use eligibility::{is_eligible, is_text_file};

use crate::config::Config;
use crate::store::{Fingerprint, TokenStore};
use serde::Serialize;
use std::path::Path;

/// Outcome of evaluating one enumerated path against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Not a regular text file under the size cap
    Ineligible,
    /// Fingerprint matches the stored record; content was not read
    Unchanged,
    /// No stored record
    New,
    /// Stored record with a different fingerprint
    Changed,
}

/// What a worker hands to the writer for one path
#[derive(Debug)]
pub struct ProcessedFile {
    pub status: FileStatus,
    pub fingerprint: Fingerprint,
    /// Distinct accepted tokens in first-occurrence order; empty unless
    /// the file was (re-)tokenized
    pub tokens: Vec<String>,
}

/// Statistics from an indexing run
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexStats {
    pub files_seen: usize,
    pub files_new: usize,
    pub files_changed: usize,
    pub files_unchanged: usize,
    pub files_ineligible: usize,
    /// Rows deleted because the path vanished or became ineligible
    pub files_removed: usize,
    /// Per-file failures absorbed by the error budget
    pub files_failed: usize,
    pub tokens_written: usize,
    pub flushes: usize,
    pub elapsed_ms: u64,
}

impl IndexStats {
    /// Files whose content was tokenized during the run
    pub fn files_tokenized(&self) -> usize {
        self.files_new + self.files_changed
    }

    fn record(&mut self, status: FileStatus) {
        self.files_seen += 1;
        match status {
            FileStatus::Ineligible => self.files_ineligible += 1,
            FileStatus::Unchanged => self.files_unchanged += 1,
            FileStatus::New => self.files_new += 1,
            FileStatus::Changed => self.files_changed += 1,
        }
    }
}

/// One indexing pass over a directory, writing into a single store.
///
/// The indexer is the only writer for the duration of [`Indexer::run`];
/// running two indexers against the same database from different processes
/// is not supported.
pub struct Indexer<'a> {
    store: &'a mut TokenStore,
    config: &'a Config,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a mut TokenStore, config: &'a Config) -> Self {
        Self { store, config }
    }
}

/// Key under which a path is stored
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
