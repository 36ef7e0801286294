//! Eligibility gate: which files are tokenized at all

use crate::config::IndexingConfig;
use std::fs::{File, Metadata};
use std::io::{self, Read};
use std::path::Path;

/// Whether the file at `path` looks like text.
///
/// Reads up to `lookahead` bytes from the start of the file. An empty file is
/// not text. Otherwise the window must be valid UTF-8, except that a
/// multi-byte sequence cut off by the end of a full window is allowed.
pub fn is_text_file(path: &Path, lookahead: usize) -> io::Result<bool> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(lookahead);
    file.take(lookahead as u64).read_to_end(&mut buf)?;

    if buf.is_empty() {
        return Ok(false);
    }

    Ok(match std::str::from_utf8(&buf) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && buf.len() == lookahead,
    })
}

/// Full eligibility predicate given already-fetched metadata: a regular file,
/// strictly smaller than `max_file_size`, recognized as text.
pub fn is_eligible(path: &Path, meta: &Metadata, config: &IndexingConfig) -> io::Result<bool> {
    if !meta.is_file() || meta.len() >= config.max_file_size {
        return Ok(false);
    }
    is_text_file(path, config.text_lookahead)
}
