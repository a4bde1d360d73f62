//! Time-expiring loading cache
//!
//! Entries are produced on demand by an injected loader and dropped once they
//! have not been accessed for the idle window. The cache knows nothing about
//! what it stores or where it comes from:
//! - Lookups hand out a shared handle, the same one for as long as the entry
//!   stays resident, so concurrent users observe each other's writes
//! - Idle time is measured from the last access, not from creation
//! - Expired entries are only removed by [`ExpiringCache::cleanup`], which
//!   callers run on a schedule; lookups never block on eviction work

use log::debug;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Shared handle to a resident value.
pub type Shared<V> = Arc<Mutex<V>>;

type Loader<K, V> = Box<dyn Fn(&K) -> V + Send + Sync>;

/// A resident value and its access bookkeeping
#[derive(Debug)]
struct Entry<V> {
    value: Shared<V>,
    last_access: Mutex<Instant>,
}

impl<V> Entry<V> {
    fn new(value: V, now: Instant) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
            last_access: Mutex::new(now),
        }
    }

    fn touch(&self, now: Instant) {
        let mut last_access = lock(&self.last_access);
        if now > *last_access {
            *last_access = now;
        }
    }

    fn is_expired(&self, idle: Duration, now: Instant) -> bool {
        now.saturating_duration_since(*lock(&self.last_access)) > idle
    }
}

pub struct ExpiringCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    idle: Duration,
    loader: Loader<K, V>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(idle: Duration, loader: impl Fn(&K) -> V + Send + Sync + 'static) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            idle,
            loader: Box::new(loader),
        }
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Returns the resident value for `key`, loading it on a miss.
    ///
    /// Misses are loaded under the write lock so a key is never loaded twice.
    pub fn get(&self, key: &K) -> Shared<V> {
        let now = Instant::now();

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(key) {
                entry.touch(now);
                return Arc::clone(&entry.value);
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            debug!("Loading cache entry {:?}", key);
            Entry::new((self.loader)(key), now)
        });
        entry.touch(now);
        Arc::clone(&entry.value)
    }

    /// True if `key` is resident. Does not count as an access.
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Visits every resident value. Does not count as an access.
    pub fn for_each(&self, mut visit: impl FnMut(&K, &V)) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for (key, entry) in entries.iter() {
            visit(key, &lock(&entry.value));
        }
    }

    /// Removes entries idle for longer than the window and returns their keys.
    ///
    /// `on_evict` runs for each removed value before any new load of the same
    /// key can start.
    pub fn cleanup(&self, mut on_evict: impl FnMut(&K, &V)) -> Vec<K> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.idle, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = entries.remove(key) {
                debug!("Evicting idle cache entry {:?}", key);
                on_evict(key, &lock(&entry.value));
            }
        }

        expired
    }

    /// Drops every resident entry without looking at it.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_all_with(|| {})
    }

    /// Drops every resident entry, running `then` before any new load can start.
    pub fn invalidate_all_with(&self, then: impl FnOnce()) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        then();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Locks a mutex, recovering the data if a holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
