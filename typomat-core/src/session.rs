//! Per-directory sessions and the engine that hands them out

use crate::config::Config;
use crate::error::TypomatError;
use crate::index::{IndexStats, Indexer};
use crate::sample;
use crate::store::{DirId, SharedStore, StoreRegistry, StoreStatus, TokenStore};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A directory, its identity, its store handle and whether it has been
/// indexed during this session.
pub struct Session {
    dir: PathBuf,
    id: DirId,
    store: SharedStore,
    config: Arc<Config>,
    indexed: AtomicBool,
}

impl Session {
    /// Open a session for `dir`, which must be an existing directory
    pub fn open(dir: &Path, registry: &StoreRegistry, config: Arc<Config>) -> crate::Result<Self> {
        let dir = canonical_dir(dir)?;
        let id = DirId::from_path(&dir);
        let store = registry.open_or_create(&id)?;
        Ok(Self::from_parts(dir, id, store, config, false))
    }

    fn from_parts(
        dir: PathBuf,
        id: DirId,
        store: SharedStore,
        config: Arc<Config>,
        indexed: bool,
    ) -> Self {
        Self {
            dir,
            id,
            store,
            config,
            indexed: AtomicBool::new(indexed),
        }
    }

    /// Canonical absolute path of the directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn id(&self) -> &DirId {
        &self.id
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed.load(Ordering::Acquire)
    }

    fn lock_store(&self) -> MutexGuard<'_, TokenStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Full indexing pass, unconditionally
    pub fn index(&self) -> crate::Result<IndexStats> {
        let mut store = self.lock_store();
        self.index_locked(&mut store)
    }

    /// Index once per session; later calls return `None` without walking
    pub fn ensure_indexed(&self) -> crate::Result<Option<IndexStats>> {
        if self.is_indexed() {
            return Ok(None);
        }
        let mut store = self.lock_store();
        // Another caller may have finished while we waited for the lock
        if self.is_indexed() {
            return Ok(None);
        }
        self.index_locked(&mut store).map(Some)
    }

    fn index_locked(&self, store: &mut TokenStore) -> crate::Result<IndexStats> {
        let stats = Indexer::new(store, &self.config).run(&self.dir)?;
        self.indexed.store(true, Ordering::Release);
        Ok(stats)
    }

    /// Prompt of at most `max_len` characters, indexing first if needed
    pub fn prompt(&self, max_len: usize) -> crate::Result<String> {
        self.prompt_with(max_len, &mut rand::rng())
    }

    /// [`Session::prompt`] with an explicit random source
    pub fn prompt_with<R: Rng>(&self, max_len: usize, rng: &mut R) -> crate::Result<String> {
        self.ensure_indexed()?;
        let store = self.lock_store();
        sample::prompt(&store, max_len, self.config.tokens.min_token_len, rng)?
            .ok_or_else(|| TypomatError::NoTokens(self.dir.clone()))
    }

    pub fn status(&self) -> crate::Result<StoreStatus> {
        self.lock_store().status()
    }
}

#[derive(Default)]
struct Sessions {
    open: HashMap<DirId, Arc<Session>>,
    /// Directories indexed by a session whose store handle was since evicted
    indexed: HashSet<DirId>,
}

/// Entry point by directory path: owns configuration, the store registry
/// and one session per directory.
pub struct Engine {
    config: Arc<Config>,
    cache_dir: PathBuf,
    registry: StoreRegistry,
    sessions: Mutex<Sessions>,
}

impl Engine {
    pub fn new(config: Config) -> crate::Result<Self> {
        let cache_dir = config.cache_dir()?;
        let registry = StoreRegistry::new(&cache_dir, config.store.clone());
        debug!(cache_dir = %cache_dir.display(), "Engine ready");
        Ok(Self {
            config: Arc::new(config),
            cache_dir,
            registry,
            sessions: Mutex::new(Sessions::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Session for `dir`, reusing the open one while it shares the
    /// registry's store handle
    pub fn session(&self, dir: &Path) -> crate::Result<Arc<Session>> {
        let dir = canonical_dir(dir)?;
        let id = DirId::from_path(&dir);
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        let store = self.registry.open_or_create(&id)?;
        if let Some(session) = sessions.open.get(&id) {
            if Arc::ptr_eq(&session.store, &store) {
                return Ok(Arc::clone(session));
            }
        }

        let indexed = sessions.indexed.remove(&id)
            || sessions.open.get(&id).is_some_and(|s| s.is_indexed());
        let session = Arc::new(Session::from_parts(
            dir,
            id.clone(),
            store,
            Arc::clone(&self.config),
            indexed,
        ));
        sessions.open.insert(id, Arc::clone(&session));

        // Drop sessions whose handles the registry evicted, remembering
        // which directories were already indexed
        let evicted: Vec<DirId> = sessions
            .open
            .keys()
            .filter(|k| !self.registry.is_open(k))
            .cloned()
            .collect();
        for key in evicted {
            if let Some(old) = sessions.open.remove(&key) {
                if old.is_indexed() {
                    sessions.indexed.insert(key);
                }
            }
        }

        Ok(session)
    }

    /// Prompt for `dir`: the first call per directory indexes it, later
    /// calls only sample
    pub fn prompt(&self, dir: &Path, max_len: usize) -> crate::Result<String> {
        self.session(dir)?.prompt(max_len)
    }

    /// Unconditional full indexing pass over `dir`
    pub fn index(&self, dir: &Path) -> crate::Result<IndexStats> {
        self.session(dir)?.index()
    }

    pub fn status(&self, dir: &Path) -> crate::Result<StoreStatus> {
        self.session(dir)?.status()
    }

    /// Delete the storage of one directory; the next prompt re-indexes it.
    ///
    /// Sessions still held by callers keep their handle, now empty.
    pub fn forget(&self, dir: &Path) -> crate::Result<()> {
        let dir = canonical_dir(dir)?;
        let id = DirId::from_path(&dir);
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.open.remove(&id) {
            session.indexed.store(false, Ordering::Release);
        }
        sessions.indexed.remove(&id);
        self.registry.forget(&id)
    }

    /// Delete every storage unit under the cache directory
    pub fn purge_cache(&self) -> crate::Result<usize> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, session) in sessions.open.drain() {
            session.indexed.store(false, Ordering::Release);
        }
        sessions.indexed.clear();
        self.registry.purge()
    }
}

fn canonical_dir(dir: &Path) -> crate::Result<PathBuf> {
    match fs::canonicalize(dir) {
        Ok(path) if path.is_dir() => Ok(path),
        _ => Err(TypomatError::InvalidDirectory(dir.to_path_buf())),
    }
}
