//! Indexing pipeline: parallel workers, single writer, buffered flushing, pruning.

use super::{is_eligible, list_files, path_key, FileStatus, IndexStats, Indexer, ProcessedFile};
use crate::config::{Config, TokenConfig};
use crate::error::TypomatError;
use crate::store::{FileRecord, Fingerprint, TokenRecord, WriteBatch};
use crate::tokenize::tokenize_file;
use crossbeam_channel::Receiver;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

type WorkerResult = (String, crate::Result<ProcessedFile>);

impl Indexer<'_> {
    /// Run a full pass over `root`.
    ///
    /// Batches flushed before an error stay committed; a later run only
    /// redoes files whose fingerprint was not persisted.
    pub fn run(&mut self, root: &Path) -> crate::Result<IndexStats> {
        let started = Instant::now();
        let config = self.config;

        let paths = list_files(root, &config.discovery)?;
        if paths.is_empty() {
            return Err(TypomatError::EmptyDirectory(root.to_path_buf()));
        }

        let prior: HashMap<String, Fingerprint> = self
            .store
            .list_files()?
            .into_iter()
            .map(|f| {
                let fingerprint = f.fingerprint();
                (f.path, fingerprint)
            })
            .collect();
        let mut unseen: HashSet<String> = prior.keys().cloned().collect();

        let workers = config.worker_count();
        let batches = workers.min(paths.len()).max(1);
        let chunk_size = paths.len().div_ceil(batches);
        info!(
            root = %root.display(),
            file_count = paths.len(),
            known_files = prior.len(),
            batches,
            "Indexing directory"
        );

        let (sender, receiver) =
            crossbeam_channel::bounded::<WorkerResult>(config.indexing.channel_capacity.max(1));

        // Set on the first hard error so workers stop at the next file boundary
        let cancelled = AtomicBool::new(false);
        let cancelled_ref = &cancelled;
        let prior_ref = &prior;

        let mut stats = IndexStats::default();

        let consumed: crate::Result<()> = std::thread::scope(|s| {
            s.spawn(move || {
                paths
                    .par_chunks(chunk_size)
                    .for_each_with(sender, |sender, batch| {
                        for path in batch {
                            if cancelled_ref.load(Ordering::Relaxed) {
                                return;
                            }
                            let key = path_key(path);
                            let result = process_file(path, prior_ref.get(&key).copied(), config);
                            if sender.send((key, result)).is_err() {
                                // Writer gone
                                cancelled_ref.store(true, Ordering::Relaxed);
                                return;
                            }
                        }
                    });
            });

            self.consume(receiver, prior_ref, &mut unseen, &mut stats, cancelled_ref)
        });
        consumed?;

        if !unseen.is_empty() {
            let mut removed: Vec<String> = unseen.into_iter().collect();
            removed.sort();
            self.store.remove_files(&removed)?;
            debug!(count = removed.len(), "Pruned files no longer in the tree");
            stats.files_removed += removed.len();
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            root = %root.display(),
            seen = stats.files_seen,
            tokenized = stats.files_tokenized(),
            unchanged = stats.files_unchanged,
            removed = stats.files_removed,
            failed = stats.files_failed,
            tokens_written = stats.tokens_written,
            elapsed_ms = stats.elapsed_ms,
            "Indexing complete"
        );
        Ok(stats)
    }

    /// Writer loop; the receiver is dropped on return, which unblocks workers
    fn consume(
        &mut self,
        receiver: Receiver<WorkerResult>,
        prior: &HashMap<String, Fingerprint>,
        unseen: &mut HashSet<String>,
        stats: &mut IndexStats,
        cancelled: &AtomicBool,
    ) -> crate::Result<()> {
        let budget = self.config.indexing.max_file_errors;
        let threshold = self.config.indexing.token_buffer_size.max(1);
        let mut batch = WriteBatch::default();

        for (key, result) in receiver.iter() {
            let processed = match result {
                Ok(processed) => processed,
                Err(e) if e.is_file_local() && stats.files_failed < budget => {
                    stats.files_failed += 1;
                    warn!(file_path = %key, error = %e, "Skipping file");
                    continue;
                }
                Err(e) => {
                    cancelled.store(true, Ordering::Relaxed);
                    if e.is_file_local() && budget > 0 {
                        warn!(file_path = %key, error = %e, "Error budget exhausted");
                        return Err(TypomatError::TooManyErrors {
                            count: stats.files_failed + 1,
                            limit: budget,
                        });
                    }
                    return Err(e);
                }
            };

            unseen.remove(&key);
            stats.record(processed.status);
            debug!(file_path = %key, status = ?processed.status, tokens = processed.tokens.len(), "Processed file");

            match processed.status {
                FileStatus::Unchanged => {}
                FileStatus::Ineligible => {
                    if prior.contains_key(&key) {
                        batch.removed.push(key.clone());
                        stats.files_removed += 1;
                    }
                }
                FileStatus::Changed => {
                    batch.invalidated.push(key.clone());
                    batch.files.push(FileRecord::new(key.clone(), processed.fingerprint));
                }
                FileStatus::New => {
                    batch.files.push(FileRecord::new(key.clone(), processed.fingerprint));
                }
            }

            batch.tokens.extend(processed.tokens.into_iter().map(|value| TokenRecord {
                path: key.clone(),
                value,
            }));

            if batch.tokens.len() >= threshold {
                if let Err(e) = self.flush(&mut batch, stats) {
                    cancelled.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        self.flush(&mut batch, stats)
    }

    fn flush(&mut self, batch: &mut WriteBatch, stats: &mut IndexStats) -> crate::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.store.apply(batch)?;
        stats.tokens_written += batch.tokens.len();
        stats.flushes += 1;
        batch.clear();
        Ok(())
    }
}

/// Evaluate one path: stat, compare fingerprints, check eligibility, tokenize.
///
/// An unchanged file is decided from `stat` alone and never opened.
pub(crate) fn process_file(
    path: &Path,
    prior: Option<Fingerprint>,
    config: &Config,
) -> crate::Result<ProcessedFile> {
    let meta = fs::metadata(path).map_err(|e| TypomatError::file_op(path, e))?;
    let fingerprint =
        Fingerprint::from_metadata(&meta).map_err(|e| TypomatError::file_op(path, e))?;

    if prior == Some(fingerprint) {
        return Ok(ProcessedFile {
            status: FileStatus::Unchanged,
            fingerprint,
            tokens: Vec::new(),
        });
    }

    let eligible =
        is_eligible(path, &meta, &config.indexing).map_err(|e| TypomatError::file_op(path, e))?;
    if !eligible {
        return Ok(ProcessedFile {
            status: FileStatus::Ineligible,
            fingerprint,
            tokens: Vec::new(),
        });
    }

    let status = if prior.is_some() {
        FileStatus::Changed
    } else {
        FileStatus::New
    };

    Ok(ProcessedFile {
        status,
        fingerprint,
        tokens: unique_tokens(path, &config.tokens)?,
    })
}

/// Accepted tokens of a file, deduplicated with first occurrence winning
fn unique_tokens(path: &Path, bounds: &TokenConfig) -> crate::Result<Vec<String>> {
    let tokens = tokenize_file(path, |word| bounds.accepts_word(word))
        .map_err(|e| TypomatError::file_op(path, e))?;

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for token in tokens {
        let token = token.map_err(|source| TypomatError::TextProcessing {
            path: path.to_path_buf(),
            source,
        })?;
        if bounds.accepts_token(&token) && !seen.contains(&token) {
            seen.insert(token.clone());
            unique.push(token);
        }
    }
    Ok(unique)
}
