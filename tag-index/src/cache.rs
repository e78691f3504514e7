use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

const DEFAULT_CAPACITY: usize = 64;

/// Memoised query results keyed by `(directory, query key)`.
///
/// Values are shared behind [`Arc`] so hits are cheap. Rebuilding the tags of
/// a directory must call [`QueryCache::invalidate`] for it.
#[derive(Debug)]
pub struct QueryCache<V> {
    entries: Mutex<LruCache<(PathBuf, String), Arc<V>>>,
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<V> QueryCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1))
            .unwrap_or_else(|| unreachable!("cache capacity must be non-zero"));
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<(PathBuf, String), Arc<V>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, dir: &Path, key: &str) -> Option<Arc<V>> {
        self.lock().get(&(dir.to_path_buf(), key.to_string())).cloned()
    }

    pub fn insert(&self, dir: &Path, key: &str, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.lock()
            .put((dir.to_path_buf(), key.to_string()), Arc::clone(&value));
        value
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_try_insert<E>(
        &self,
        dir: &Path,
        key: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(dir, key) {
            log::debug!("Cache hit for {key:?} under {}", dir.display());
            return Ok(hit);
        }
        log::debug!("Cache miss for {key:?} under {}", dir.display());
        Ok(self.insert(dir, key, compute()?))
    }

    /// Drop every entry for `dir` or a directory below it. Returns the count.
    pub fn invalidate(&self, dir: &Path) -> usize {
        let mut entries = self.lock();
        let stale: Vec<(PathBuf, String)> = entries
            .iter()
            .filter(|((entry_dir, _), _)| entry_dir.starts_with(dir))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
