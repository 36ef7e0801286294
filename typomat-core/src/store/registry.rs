//! Process-wide registry of open token stores, one per indexed directory

use super::{db_files, TokenStore};
use crate::config::StoreConfig;
use crate::error::TypomatError;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info};

/// Store handle shared between sessions of the same directory
pub type SharedStore = Arc<Mutex<TokenStore>>;

/// Stable identity of an indexed directory: hex SHA-256 of its absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirId(String);

impl DirId {
    /// Expects an absolute, normalized path
    pub fn from_path(abs_path: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(abs_path.as_os_str().as_encoded_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct OpenStores {
    stores: HashMap<DirId, SharedStore>,
    /// Least recently used first
    order: VecDeque<DirId>,
    /// Handles dropped from the cache that sessions may still hold
    released: HashMap<DirId, Weak<Mutex<TokenStore>>>,
}

impl OpenStores {
    fn touch(&mut self, id: &DirId) {
        self.order.retain(|k| k != id);
        self.order.push_back(id.clone());
    }

    /// Drop the cached handle, remembering it weakly
    fn release(&mut self, id: &DirId) -> bool {
        self.order.retain(|k| k != id);
        match self.stores.remove(id) {
            Some(store) => {
                self.released.insert(id.clone(), Arc::downgrade(&store));
                true
            }
            None => false,
        }
    }

    fn reclaim(&mut self, id: &DirId) -> Option<SharedStore> {
        self.released.remove(id).and_then(|weak| weak.upgrade())
    }

    /// Handles still alive outside the cache
    fn live_released(&mut self) -> Vec<(DirId, SharedStore)> {
        self.released.retain(|_, weak| weak.strong_count() > 0);
        self.released
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|store| (id.clone(), store)))
            .collect()
    }
}

/// Bounded cache of open store handles keyed by [`DirId`].
///
/// Evicting a handle only drops the registry's reference; sessions that
/// still hold it keep working, and reopening the directory while they do
/// returns that same handle, so one directory never has two writers.
pub struct StoreRegistry {
    db_dir: PathBuf,
    config: StoreConfig,
    open: Mutex<OpenStores>,
}

impl StoreRegistry {
    /// Databases live in `<cache_dir>/db/`
    pub fn new(cache_dir: &Path, config: StoreConfig) -> Self {
        Self {
            db_dir: cache_dir.join("db"),
            config,
            open: Mutex::new(OpenStores {
                stores: HashMap::new(),
                order: VecDeque::new(),
                released: HashMap::new(),
            }),
        }
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// `<cache_dir>/db/<id>.db`
    pub fn db_path(&self, id: &DirId) -> PathBuf {
        self.db_dir.join(format!("{}.db", id.as_str()))
    }

    /// Return the cached handle for `id`, opening (and creating) it if needed
    pub fn open_or_create(&self, id: &DirId) -> crate::Result<SharedStore> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(store) = open.stores.get(id).cloned() {
            open.touch(id);
            return Ok(store);
        }

        let store = match open.reclaim(id) {
            Some(store) => {
                debug!(dir_id = %id, "Reclaimed live token store handle");
                store
            }
            None => {
                let store = TokenStore::open(&self.db_path(id), self.config.batch_size)?;
                Arc::new(Mutex::new(store))
            }
        };
        open.stores.insert(id.clone(), Arc::clone(&store));
        open.touch(id);

        let max_open = self.config.max_open_stores.max(1);
        while open.stores.len() > max_open {
            let Some(oldest) = open.order.pop_front() else {
                break;
            };
            open.release(&oldest);
            debug!(dir_id = %oldest, "Evicted token store handle");
        }
        open.released.retain(|_, weak| weak.strong_count() > 0);

        Ok(store)
    }

    /// Drop the registry's handle for `id`. Returns whether one was open.
    pub fn close(&self, id: &DirId) -> bool {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.release(id)
    }

    pub fn close_all(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<DirId> = open.stores.keys().cloned().collect();
        for id in &ids {
            open.release(id);
        }
    }

    pub fn is_open(&self, id: &DirId) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.stores.contains_key(id)
    }

    pub fn open_count(&self) -> usize {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.stores.len()
    }

    /// Close and delete the storage of one directory, forcing a full re-index.
    ///
    /// A handle still held elsewhere is emptied in place instead; its files
    /// stay on disk under the open connection.
    pub fn forget(&self, id: &DirId) -> crate::Result<()> {
        let live = {
            let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
            open.release(id);
            open.released.get(id).and_then(Weak::upgrade)
        };

        let Some(store) = live else {
            return super::remove_db_files(&self.db_path(id));
        };
        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store.clear()
    }

    /// Close every handle and delete every storage unit; stores still held
    /// elsewhere are emptied in place
    pub fn purge(&self) -> crate::Result<usize> {
        let live = {
            self.close_all();
            let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
            open.live_released()
        };

        let mut keep = HashSet::new();
        for (id, store) in &live {
            store.lock().unwrap_or_else(PoisonError::into_inner).clear()?;
            keep.extend(db_files(&self.db_path(id)));
        }
        purge_dir(&self.db_dir, &keep)
    }
}

/// Delete every per-directory database under `<cache_dir>/db/`
pub fn purge_cache(cache_dir: &Path) -> crate::Result<usize> {
    purge_dir(&cache_dir.join("db"), &HashSet::new())
}

fn purge_dir(db_dir: &Path, keep: &HashSet<PathBuf>) -> crate::Result<usize> {
    let entries = match fs::read_dir(db_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(TypomatError::file_op(db_dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| TypomatError::file_op(db_dir, e))?;
        let path = entry.path();
        if path.is_file() && !keep.contains(&path) {
            fs::remove_file(&path).map_err(|e| TypomatError::file_op(&path, e))?;
            removed += 1;
        }
    }

    info!(db_dir = %db_dir.display(), removed, "Purged token store cache");
    Ok(removed)
}
