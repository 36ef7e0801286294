//! File discovery: walk a root directory honoring one root-level ignore file.

use crate::config::DiscoveryConfig;
use crate::error::TypomatError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version-control metadata, never walked: a directory, or a gitfile in
/// worktrees and submodules
const VCS_DIR: &str = ".git";

/// List every file under `root`, sorted, as absolute paths.
///
/// Only the ignore file at the root is honored (no nested, global or
/// `.git/info/exclude` rules). Symlinks are not followed; they are listed
/// like plain files and resolved later by `stat`.
pub fn list_files(root: &Path, config: &DiscoveryConfig) -> crate::Result<Vec<PathBuf>> {
    let root = std::path::absolute(root).map_err(|e| TypomatError::file_op(root, e))?;
    let ignore = root_ignore(&root, &config.ignore_file);
    let exclude = exclude_set(&config.exclude)?;

    let mut builder = WalkBuilder::new(&root);
    builder.standard_filters(false);
    builder.follow_links(false);
    builder.filter_entry(move |entry| {
        if entry.depth() == 0 {
            return true;
        }
        if entry.file_name() == VCS_DIR {
            return false;
        }
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        !ignore.matched(entry.path(), is_dir).is_ignore()
    });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry.map_err(|e| TypomatError::Walk {
            root: root.clone(),
            message: e.to_string(),
        })?;

        match entry.file_type() {
            Some(ft) if !ft.is_dir() => {}
            _ => continue,
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if exclude.is_match(relative) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    debug!(root = %root.display(), file_count = files.len(), "Listed files");
    Ok(files)
}

/// Compile `<root>/<ignore_file>`; a missing or unreadable file ignores nothing
fn root_ignore(root: &Path, ignore_file: &str) -> Gitignore {
    if ignore_file.is_empty() {
        return Gitignore::empty();
    }

    let path = root.join(ignore_file);
    if !path.is_file() {
        return Gitignore::empty();
    }

    let mut builder = GitignoreBuilder::new(root);
    if let Some(e) = builder.add(&path) {
        warn!(ignore_file = %path.display(), error = %e, "Ignore file partially parsed");
    }
    builder.build().unwrap_or_else(|e| {
        warn!(ignore_file = %path.display(), error = %e, "Ignore file unusable");
        Gitignore::empty()
    })
}

/// Extra exclusions; a bare name matches that file or directory anywhere
fn exclude_set(patterns: &[String]) -> crate::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let is_glob = pattern.contains(|c: char| matches!(c, '*' | '?' | '[' | '{'));
        let expanded = if is_glob {
            vec![pattern.clone()]
        } else {
            vec![format!("**/{pattern}"), format!("**/{pattern}/**")]
        };
        for p in expanded {
            builder.add(Glob::new(&p).map_err(|e| TypomatError::GlobPattern(e.to_string()))?);
        }
    }
    builder
        .build()
        .map_err(|e| TypomatError::GlobPattern(e.to_string()))
}
