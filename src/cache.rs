//! Bounded LRU cache of scaled pages.
//!
//! Only index bookkeeping happens under the mutex; decode/encode runs with no
//! lock held, so misses on different pages scale concurrently. A miss on a
//! page that another thread is already computing waits for that result
//! instead of decoding again, so a broken page is reported once.
//!
//! Recency is a sequence counter: every touch stamps the entry with a fresh
//! tick and appends `(tick, id)` to `order`. Eviction pops from the front and
//! skips records whose tick no longer matches the entry (stale touches).
//! `order` is compacted once stale records dominate.
//!
//! Every computed page is also written to `<scratch>/page-<hash>.png` because
//! the display host loads images by path. The file is written under a temp
//! name and renamed into place, so a reader never sees a partial page even
//! while an evicted page is recomputed over it. Files live until `teardown()`.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use tempfile::{NamedTempFile, TempDir};

use crate::error::{Result, ViewerError};
use crate::notice::NoticeSender;
use crate::page::{PageId, ScaledPage};
use crate::scale::Scaler;

/// Current page + 2 forward + 1 backward + 1 slack.
pub const DEFAULT_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Slot {
    page: ScaledPage,
    stamp: u64,
}

struct LruState {
    entries: HashMap<PageId, Slot>,
    order: VecDeque<(u64, PageId)>,
    tick: u64,
    stats: CacheStats,
    /// Pages some thread is scaling right now.
    computing: HashSet<PageId>,
}

impl LruState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            tick: 0,
            stats: CacheStats::default(),
            computing: HashSet::new(),
        }
    }

    /// Mark `id` most recently used. No-op if absent.
    fn touch(&mut self, id: &PageId) {
        let Some(slot) = self.entries.get_mut(id) else {
            return;
        };
        self.tick += 1;
        slot.stamp = self.tick;
        self.order.push_back((self.tick, id.clone()));
        self.compact();
    }

    fn insert(&mut self, id: PageId, page: ScaledPage) {
        self.entries.insert(id.clone(), Slot { page, stamp: 0 });
        self.touch(&id);
    }

    fn evict_lru(&mut self) -> Option<PageId> {
        while let Some((stamp, id)) = self.order.pop_front() {
            let live = self.entries.get(&id).is_some_and(|s| s.stamp == stamp);
            if live {
                self.entries.remove(&id);
                self.stats.evictions += 1;
                return Some(id);
            }
        }
        None
    }

    fn compact(&mut self) {
        if self.order.len() <= 2 * self.entries.len() + 16 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(stamp, id)| entries.get(id).is_some_and(|s| s.stamp == *stamp));
        trace!("cache: compacted recency queue to {}", self.order.len());
    }
}

/// Directory holding persisted scaled pages for the session.
struct ScratchDir {
    dir: TempDir,
    written: Mutex<HashSet<PathBuf>>,
}

impl ScratchDir {
    fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("fitview-scaled-").tempdir()?;
        debug!("cache: scratch dir {}", dir.path().display());
        Ok(Self {
            dir,
            written: Mutex::new(HashSet::new()),
        })
    }

    fn path_for(&self, id: &PageId) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        self.dir
            .path()
            .join(format!("page-{:016x}.png", hasher.finish()))
    }

    /// Write (or atomically replace) the file for `id`.
    fn persist(&self, id: &PageId, raster: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(id);
        let temp_io = |source: io::Error| ViewerError::TempIo {
            path: path.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(self.dir.path()).map_err(temp_io)?;
        tmp.write_all(raster).map_err(temp_io)?;
        tmp.persist(&path).map_err(|e| temp_io(e.error))?;
        lock(&self.written).insert(path.clone());
        Ok(path)
    }

    fn remove_all(&self) -> usize {
        let files: Vec<PathBuf> = lock(&self.written).drain().collect();
        let mut removed = 0;
        for path in files {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("cache: failed to remove {}: {e}", path.display()),
            }
        }
        removed
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe LRU store of scaled pages, shared via `Arc`.
pub struct PageCache {
    scaler: Box<dyn Scaler>,
    capacity: usize,
    state: Mutex<LruState>,
    /// Signalled whenever a page leaves `computing`.
    computed: Condvar,
    scratch: ScratchDir,
    notices: NoticeSender,
}

/// Clears the `computing` mark on every exit path, panics included.
struct ComputeGuard<'a> {
    cache: &'a PageCache,
    id: &'a PageId,
}

impl Drop for ComputeGuard<'_> {
    fn drop(&mut self) {
        lock(&self.cache.state).computing.remove(self.id);
        self.cache.computed.notify_all();
    }
}

impl PageCache {
    /// Create a cache holding at most `capacity` pages (minimum 1).
    pub fn new(scaler: Box<dyn Scaler>, capacity: usize, notices: NoticeSender) -> Result<Self> {
        Ok(Self {
            scaler,
            capacity: capacity.max(1),
            state: Mutex::new(LruState::new()),
            computed: Condvar::new(),
            scratch: ScratchDir::new()?,
            notices,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is cached. Does not affect recency.
    pub fn contains(&self, id: &PageId) -> bool {
        lock(&self.state).entries.contains_key(id)
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }

    /// Return the cached page, or scale, persist and insert it.
    pub fn get_or_compute(&self, id: &PageId) -> ScaledPage {
        {
            let mut state = lock(&self.state);
            loop {
                if let Some(page) = state.entries.get(id).map(|s| s.page.clone()) {
                    state.touch(id);
                    state.stats.hits += 1;
                    trace!("cache: hit {id}");
                    return page;
                }
                if state.computing.insert(id.clone()) {
                    state.stats.misses += 1;
                    break;
                }
                trace!("cache: waiting for in-flight scale of {id}");
                state = self
                    .computed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        let _computing = ComputeGuard { cache: self, id };

        debug!("cache: miss {id}, scaling");
        let mut page = self.scaler.scale(id);
        match self.scratch.persist(id, &page.raster) {
            Ok(path) => page.file = Some(path),
            Err(e) => self.notices.report(&e),
        }

        let mut state = lock(&self.state);
        state.insert(id.clone(), page.clone());
        while state.entries.len() > self.capacity {
            match state.evict_lru() {
                Some(evicted) => debug!("cache: evict {evicted}"),
                None => break,
            }
        }
        drop(state);
        page
    }

    /// Scratch directory holding persisted pages.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.dir.path()
    }

    /// Delete every persisted page file. The directory itself goes with the cache.
    pub fn teardown(&self) {
        let removed = self.scratch.remove_all();
        debug!("cache: teardown removed {removed} scaled file(s)");
    }
}
