//! Per-directory token store backed by SQLite

mod cursor;
mod registry;

pub use cursor::TokenCursor;
pub use registry::{purge_cache, DirId, SharedStore, StoreRegistry};

use crate::error::TypomatError;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const SCHEMA_VERSION: i32 = 1;

/// SQLite's default cap on bind variables per statement
const MAX_BIND_VARIABLES: usize = 32_766;

/// Version of a file as of its last tokenization: `(size, mtime)`.
///
/// Equality of fingerprints is the only definition of "unchanged"; file
/// content is never hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub size: u64,
    /// Nanoseconds since the Unix epoch (negative before it)
    pub mtime_ns: i64,
}

impl Fingerprint {
    pub fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        let modified = meta.modified()?;
        Ok(Self {
            size: meta.len(),
            mtime_ns: system_time_to_ns(modified),
        })
    }
}

/// One indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub mtime_ns: i64,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            size: fingerprint.size,
            mtime_ns: fingerprint.mtime_ns,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            size: self.size,
            mtime_ns: self.mtime_ns,
        }
    }
}

/// "This file contributed this word"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TokenRecord {
    pub path: String,
    pub value: String,
}

/// Mutations queued by the indexer and written as one transaction.
///
/// Applied in order: tokens of `invalidated` paths are deleted, `removed`
/// paths are deleted with their tokens, then `files` and `tokens` are upserted.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub invalidated: Vec<String>,
    pub removed: Vec<String>,
    pub files: Vec<FileRecord>,
    pub tokens: Vec<TokenRecord>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.invalidated.is_empty()
            && self.removed.is_empty()
            && self.files.is_empty()
            && self.tokens.is_empty()
    }

    pub fn clear(&mut self) {
        self.invalidated.clear();
        self.removed.clear();
        self.files.clear();
        self.tokens.clear();
    }
}

/// Store summary
#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub files: usize,
    pub tokens: usize,
    pub distinct_tokens: usize,
    pub last_indexed: Option<i64>,
    pub size_bytes: u64,
}

/// Token store for a single directory
pub struct TokenStore {
    conn: Connection,
    db_path: Option<PathBuf>,
    batch_size: usize,
}

impl TokenStore {
    /// Open or create the store at `db_path`.
    ///
    /// If the database cannot be opened or its schema cannot be created, the
    /// storage files are deleted and opening is retried once.
    pub fn open(db_path: &Path, batch_size: usize) -> crate::Result<Self> {
        let conn = match Self::try_open(db_path) {
            Ok(conn) => conn,
            Err(first) => {
                warn!(
                    db_path = %db_path.display(),
                    error = %first,
                    "Token store unusable, resetting"
                );
                remove_db_files(db_path)?;
                Self::try_open(db_path).map_err(|e| TypomatError::StoreOpen {
                    path: db_path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
        };

        debug!(db_path = %db_path.display(), "Opened token store");
        Ok(Self {
            conn,
            db_path: Some(db_path.to_path_buf()),
            batch_size: batch_size.max(1),
        })
    }

    /// Store that lives only as long as the handle
    pub fn open_in_memory(batch_size: usize) -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn,
            db_path: None,
            batch_size: batch_size.max(1),
        })
    }

    fn try_open(db_path: &Path) -> crate::Result<Connection> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_schema(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version != 0 && version != SCHEMA_VERSION {
            return Err(TypomatError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            conn.execute_batch(
                "
                -- Version of each file at its last tokenization
                CREATE TABLE IF NOT EXISTS files (
                    path TEXT PRIMARY KEY,
                    size INTEGER NOT NULL,
                    mtime_ns INTEGER NOT NULL,
                    indexed_at INTEGER NOT NULL
                );

                -- Distinct tokens per file
                CREATE TABLE IF NOT EXISTS tokens (
                    path TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (path, value)
                ) WITHOUT ROWID;

                CREATE INDEX IF NOT EXISTS idx_tokens_value ON tokens(value);

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(())
    }

    /// Path of the backing database, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Insert or overwrite file records by path
    pub fn upsert_files(&mut self, files: &[FileRecord]) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let affected = upsert_files_in(&tx, files, self.batch_size)?;
        tx.commit()?;
        debug!(file_count = files.len(), rows_affected = affected, "Upserted files");
        Ok(affected)
    }

    /// Insert or overwrite token records by `(path, value)`
    pub fn upsert_tokens(&mut self, tokens: &[TokenRecord]) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let affected = upsert_tokens_in(&tx, tokens, self.batch_size)?;
        tx.commit()?;
        debug!(token_count = tokens.len(), rows_affected = affected, "Upserted tokens");
        Ok(affected)
    }

    /// Delete a file record, and its tokens when `cascade` is set
    pub fn delete_file(&mut self, path: &str, cascade: bool) -> crate::Result<()> {
        let tx = self.conn.transaction()?;
        delete_file_in(&tx, path, cascade)?;
        tx.commit()?;
        debug!(file_path = path, cascade, "Deleted file");
        Ok(())
    }

    /// Delete only the tokens of a path, ahead of re-inserting them
    pub fn delete_tokens_of_path(&mut self, path: &str) -> crate::Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM tokens WHERE path = ?", params![path])?;
        debug!(file_path = path, deleted, "Deleted tokens of file");
        Ok(deleted)
    }

    /// Delete files and their tokens in one transaction
    pub fn remove_files(&mut self, paths: &[String]) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        for path in paths {
            delete_file_in(&tx, path, true)?;
        }
        tx.commit()?;
        Ok(paths.len())
    }

    /// Write a batch of queued indexer mutations as one transaction
    pub fn apply(&mut self, batch: &WriteBatch) -> crate::Result<()> {
        let tx = self.conn.transaction()?;
        for path in &batch.invalidated {
            tx.execute("DELETE FROM tokens WHERE path = ?", params![path])?;
        }
        for path in &batch.removed {
            delete_file_in(&tx, path, true)?;
        }
        upsert_files_in(&tx, &batch.files, self.batch_size)?;
        upsert_tokens_in(&tx, &batch.tokens, self.batch_size)?;
        tx.commit()?;

        debug!(
            invalidated = batch.invalidated.len(),
            removed = batch.removed.len(),
            files = batch.files.len(),
            tokens = batch.tokens.len(),
            "Flushed write batch"
        );
        Ok(())
    }

    /// Delete every file and token, leaving an empty store
    pub fn clear(&mut self) -> crate::Result<()> {
        let tx = self.conn.transaction()?;
        let tokens = tx.execute("DELETE FROM tokens", [])?;
        let files = tx.execute("DELETE FROM files", [])?;
        tx.commit()?;
        debug!(files, tokens, "Cleared token store");
        Ok(())
    }

    /// All file records
    pub fn list_files(&self) -> crate::Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, size, mtime_ns FROM files")?;

        let rows = stmt.query_map([], |row| {
            let path: String = row.get(0)?;
            let size: i64 = row.get(1)?;
            let mtime_ns: i64 = row.get(2)?;
            Ok(FileRecord {
                path,
                size: size as u64,
                mtime_ns,
            })
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        debug!(file_count = files.len(), "Listed files");
        Ok(files)
    }

    /// Token values stored for one path, sorted
    pub fn tokens_of_path(&self, path: &str) -> crate::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM tokens WHERE path = ? ORDER BY value")?;
        let rows = stmt.query_map(params![path], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Every token record, sorted by `(path, value)`
    pub fn all_tokens(&self) -> crate::Result<Vec<TokenRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, value FROM tokens ORDER BY path, value")?;
        let rows = stmt.query_map([], |row| {
            Ok(TokenRecord {
                path: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Run `f` over a lazy, single-pass cursor of distinct token values.
    ///
    /// The underlying statement lives only for the duration of `f`, so an
    /// early return from `f` releases it.
    pub fn with_distinct_tokens<R>(
        &self,
        f: impl FnOnce(&mut TokenCursor<'_>) -> R,
    ) -> crate::Result<R> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT value FROM tokens")?;
        let rows = stmt.query([])?;
        let mut cursor = TokenCursor::new(rows);
        Ok(f(&mut cursor))
    }

    /// Get store status
    pub fn status(&self) -> crate::Result<StoreStatus> {
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let tokens: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
        let distinct_tokens: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT value) FROM tokens",
            [],
            |row| row.get(0),
        )?;
        let last_indexed: Option<i64> = self
            .conn
            .query_row("SELECT MAX(indexed_at) FROM files", [], |row| row.get(0))
            .optional()?
            .flatten();

        let size_bytes = self
            .db_path
            .as_ref()
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStatus {
            files: files as usize,
            tokens: tokens as usize,
            distinct_tokens: distinct_tokens as usize,
            last_indexed,
            size_bytes,
        })
    }
}

/// `(?, ?), (?, ?)` for a multi-row insert
fn values_clause(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

/// `batch_size`, capped so one multi-row insert stays within the bind limit
fn rows_per_statement(batch_size: usize, columns: usize) -> usize {
    batch_size.min(MAX_BIND_VARIABLES / columns).max(1)
}

fn upsert_files_in(
    conn: &Connection,
    files: &[FileRecord],
    batch_size: usize,
) -> crate::Result<usize> {
    let indexed_at = unix_now();
    let mut affected = 0;

    for chunk in files.chunks(rows_per_statement(batch_size, 4)) {
        let sql = format!(
            "INSERT INTO files (path, size, mtime_ns, indexed_at) VALUES {}
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime_ns = excluded.mtime_ns,
                indexed_at = excluded.indexed_at",
            values_clause(chunk.len(), 4)
        );

        let mut values = Vec::with_capacity(chunk.len() * 4);
        for file in chunk {
            values.push(Value::Text(file.path.clone()));
            values.push(Value::Integer(file.size as i64));
            values.push(Value::Integer(file.mtime_ns));
            values.push(Value::Integer(indexed_at));
        }

        let mut stmt = conn.prepare_cached(&sql)?;
        affected += stmt.execute(params_from_iter(values.iter()))?;
    }

    Ok(affected)
}

fn upsert_tokens_in(
    conn: &Connection,
    tokens: &[TokenRecord],
    batch_size: usize,
) -> crate::Result<usize> {
    let mut affected = 0;

    for chunk in tokens.chunks(rows_per_statement(batch_size, 2)) {
        // (path, value) is the whole row, so overwriting equals keeping
        let sql = format!(
            "INSERT INTO tokens (path, value) VALUES {}
             ON CONFLICT(path, value) DO NOTHING",
            values_clause(chunk.len(), 2)
        );

        let mut values = Vec::with_capacity(chunk.len() * 2);
        for token in chunk {
            values.push(Value::Text(token.path.clone()));
            values.push(Value::Text(token.value.clone()));
        }

        let mut stmt = conn.prepare_cached(&sql)?;
        affected += stmt.execute(params_from_iter(values.iter()))?;
    }

    Ok(affected)
}

fn delete_file_in(conn: &Connection, path: &str, cascade: bool) -> crate::Result<()> {
    conn.execute("DELETE FROM files WHERE path = ?", params![path])?;
    if cascade {
        conn.execute("DELETE FROM tokens WHERE path = ?", params![path])?;
    }
    Ok(())
}

/// A database file together with its WAL and shared-memory files
fn db_files(db_path: &Path) -> [PathBuf; 3] {
    let sibling = |suffix: &str| {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [db_path.to_path_buf(), sibling("-wal"), sibling("-shm")]
}

fn remove_db_files(db_path: &Path) -> crate::Result<()> {
    for path in db_files(db_path) {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TypomatError::file_op(path, e)),
        }
    }
    Ok(())
}

fn system_time_to_ns(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
