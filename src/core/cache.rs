//! Read-side caches.
//!
//! [`ReadArraySampleCache`] holds decoded array payloads keyed by file
//! position. [`HandleCache`] keeps weak references to lazily built child
//! handles so repeated lookups share one handle while it is alive.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::util::Result;

/// Position-based cache key.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub struct CachePos {
    pub data_pos: u64,
}

/// Thread-safe byte-budgeted cache for array sample payloads.
pub struct ReadArraySampleCache {
    cache: RwLock<HashMap<CachePos, Arc<Vec<u8>>>>,
    max_size: usize,
    current_size: AtomicUsize,
}

impl ReadArraySampleCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size,
            current_size: AtomicUsize::new(0),
        }
    }

    /// 64 MB budget.
    pub fn default_size() -> Self {
        Self::new(64 * 1024 * 1024)
    }

    #[inline]
    pub fn get(&self, key: CachePos) -> Option<Arc<Vec<u8>>> {
        self.cache.read().get(&key).cloned()
    }

    /// Insert and return the shared payload. Payloads larger than the budget
    /// are returned without being cached.
    pub fn insert(&self, key: CachePos, data: Vec<u8>) -> Arc<Vec<u8>> {
        let size = data.len();
        let data = Arc::new(data);
        if size > self.max_size {
            return data;
        }

        if self.current_size.load(Ordering::Relaxed) + size > self.max_size {
            self.evict_some();
        }

        let mut cache = self.cache.write();
        if let Some(existing) = cache.get(&key) {
            return Arc::clone(existing);
        }
        cache.insert(key, Arc::clone(&data));
        self.current_size.fetch_add(size, Ordering::Relaxed);
        data
    }

    /// Drop roughly half of the entries.
    fn evict_some(&self) {
        let mut cache = self.cache.write();
        let keys: Vec<_> = cache.keys().copied().collect();
        let mut evicted = 0;
        for key in keys.into_iter().take(cache.len() / 2 + 1) {
            if let Some(sample) = cache.remove(&key) {
                evicted += sample.len();
            }
        }
        let _ = self
            .current_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(evicted))
            });
    }

    pub fn clear(&self) {
        self.cache.write().clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }
}

impl Default for ReadArraySampleCache {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Fixed-size table of weak handles, one slot per child index.
///
/// The lock is held only for the slot lookup and the insert, never while
/// the handle is being built. Two racing builders may both construct a
/// handle; the first one stored wins and the other is dropped.
pub struct HandleCache<T: ?Sized> {
    slots: Mutex<Vec<Option<Weak<T>>>>,
}

impl<T: ?Sized> HandleCache<T> {
    pub fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new((0..len).map(|_| None).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handle at `index`, if one is cached.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.slots
            .lock()
            .get(index)
            .and_then(|slot| slot.as_ref())
            .and_then(Weak::upgrade)
    }

    /// Return the live handle at `index` or build, store and return a new one.
    /// Out-of-range indices build without caching.
    pub fn get_or_try_insert_with<F>(&self, index: usize, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<Arc<T>>,
    {
        if let Some(handle) = self.get(index) {
            return Ok(handle);
        }

        let built = build()?;

        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(index) else {
            return Ok(built);
        };
        if let Some(existing) = slot.as_ref().and_then(Weak::upgrade) {
            return Ok(existing);
        }
        *slot = Some(Arc::downgrade(&built));
        Ok(built)
    }
}
